//! JSON file storage implementation.
//!
//! Stores one pretty-printed JSON file per document under a root directory
//! (`.kaizen/` by default). Writes land in a temporary sibling first and are
//! renamed into place, so a concurrent reader in another process sees either
//! the old or the new document, never a torn one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use super::{Result, StorageError, Store};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File-based JSON storage backend.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    root: PathBuf,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir)
        });
        if path.is_empty() || escapes {
            return Err(StorageError::Other(format!(
                "Invalid document path '{}': must be relative and stay inside the store",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Store for JsonStorage {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        read_json(&self.document_path(path)?).await
    }

    async fn write(&self, path: &str, value: &Value) -> Result<()> {
        let target = self.document_path(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = target
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let tmp = target.with_file_name(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let json = serde_json::to_string_pretty(value)?;
        fs::write(&tmp, json.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("Wrote document {}", target.display());
        Ok(())
    }
}

async fn read_json(path: &Path) -> Result<Option<Value>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert!(storage.read("absent.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();

        let value = json!({"weights": {"balanced": 1.2}});
        storage.write("nested/deeper/weights.json", &value).await.unwrap();

        assert!(dir.path().join("nested/deeper/weights.json").exists());
        assert_eq!(storage.read("nested/deeper/weights.json").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        storage.write("doc.json", &json!([1, 2, 3])).await.unwrap();
        storage.write("doc.json", &json!([4])).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["doc.json".to_string()]);
        assert_eq!(storage.read("doc.json").await.unwrap(), Some(json!([4])));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert!(matches!(storage.read("bad.json").await, Err(StorageError::Json(_))));
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert!(storage.read("../outside.json").await.is_err());
        assert!(storage.write("/abs.json", &json!({})).await.is_err());
    }
}
