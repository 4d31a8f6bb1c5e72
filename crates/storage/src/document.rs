//! Typed helpers over [`Store`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Result, Store};

/// Read and decode a document. Missing documents are `Ok(None)`.
pub async fn read_document<S, T>(store: &S, path: &str) -> Result<Option<T>>
where
    S: Store + ?Sized,
    T: DeserializeOwned,
{
    match store.read(path).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode and write a document.
pub async fn write_document<S, T>(store: &S, path: &str, document: &T) -> Result<()>
where
    S: Store + ?Sized,
    T: Serialize + Sync,
{
    let value = serde_json::to_value(document)?;
    store.write(path, &value).await
}

/// Append `entry` to the array document at `path`, dropping the oldest
/// entries beyond `cap`. Returns the new length.
pub async fn append_capped<S, T>(store: &S, path: &str, entry: T, cap: usize) -> Result<usize>
where
    S: Store + ?Sized,
    T: Serialize + DeserializeOwned + Send + Sync,
{
    let mut entries: Vec<T> = read_document(store, path).await?.unwrap_or_default();
    entries.push(entry);
    if entries.len() > cap {
        let excess = entries.len() - cap;
        entries.drain(..excess);
    }
    write_document(store, path, &entries).await?;
    Ok(entries.len())
}
