//! In-process storage, for tests and single-instance embedding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Result, Store};

/// Document store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<String, Value>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Paths of all stored documents, sorted.
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.documents.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl Store for MemoryStorage {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.documents.read().await.get(path).cloned())
    }

    async fn write(&self, path: &str, value: &Value) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(path.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_write_and_count() {
        let storage = MemoryStorage::new();
        assert!(storage.read("a.json").await.unwrap().is_none());
        assert_eq!(storage.write_count(), 0);

        storage.write("a.json", &json!({"x": 1})).await.unwrap();
        storage.write("b/c.json", &json!([])).await.unwrap();

        assert_eq!(storage.read("a.json").await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(storage.write_count(), 2);
        assert_eq!(storage.paths().await, vec!["a.json".to_string(), "b/c.json".to_string()]);
    }
}
