//! Storage trait abstraction.

use async_trait::async_trait;
use serde_json::Value;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A named lock could not be acquired in time
    #[error("Timed out after {waited_ms}ms waiting for lock '{name}'")]
    LockTimeout {
        /// Lock name
        name: String,
        /// How long the caller waited
        waited_ms: u64,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Document store used by every Kaizen engine.
///
/// Paths are relative, `/`-separated document names such as
/// `"grpo-weights.json"`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a document. A missing document is `Ok(None)`, never an error.
    async fn read(&self, path: &str) -> Result<Option<Value>>;

    /// Write a document, creating any missing parent structure.
    async fn write(&self, path: &str, value: &Value) -> Result<()>;
}
