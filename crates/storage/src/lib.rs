//! Storage abstraction and implementations for Kaizen.
//!
//! Every store is a set of JSON documents addressed by a relative path.
//! `JsonStorage` keeps them as files on disk, `MemoryStorage` keeps them in
//! process. Cross-process critical sections go through a [`NamedLock`].

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;
pub mod memory;
pub mod document;
pub mod lock;

pub use trait_::{Store, StorageError, Result};
pub use json_storage::JsonStorage;
pub use memory::MemoryStorage;
pub use document::{append_capped, read_document, write_document};
pub use lock::{FileLock, LockConfig, LockGuard, MemoryLock, NamedLock};
