//! JSON document storage on the local filesystem

use super::adapter::{StorageAdapter, select_keys};
use crate::core::{Result, StateMap, StoreError};
use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Stores every key of the adapter in a single JSON object file.
///
/// Writes go to a temp file first and are renamed over the document, so a crash
/// mid-write leaves the previous document intact.
pub struct FileStorageAdapter {
    path: PathBuf,
}

impl FileStorageAdapter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StateMap> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StateMap::new()),
            Err(err) => {
                return Err(StoreError::StorageRead(format!(
                    "Failed to read state file '{}': {}",
                    self.path.display(),
                    err
                )));
            }
        };
        if raw.is_empty() {
            return Ok(StateMap::new());
        }

        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(StoreError::StorageRead(format!(
                "State file '{}' holds a {} instead of an object",
                self.path.display(),
                crate::core::json_type_name(Some(&other))
            ))),
            Err(err) => Err(StoreError::StorageRead(format!(
                "Failed to parse state file '{}': {}",
                self.path.display(),
                err
            ))),
        }
    }
}

#[async_trait]
impl StorageAdapter for FileStorageAdapter {
    async fn is_available(&self) -> bool {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).await.is_ok()
            }
            _ => true,
        }
    }

    async fn get(&self, keys: Option<&[String]>) -> Result<StateMap> {
        let document = self.read_document().await?;
        Ok(select_keys(&document, keys))
    }

    async fn set(&self, entries: StateMap) -> Result<()> {
        // An unreadable document is only written to once the caller has decided to
        // replace it, so the new entries become the whole document.
        let mut document = match self.read_document().await {
            Ok(document) => document,
            Err(err) => {
                warn!("replacing unreadable state file: {}", err);
                StateMap::new()
            }
        };
        document.extend(entries);

        let bytes = serde_json::to_vec_pretty(&Value::Object(document))?;
        atomic_write(&self.path, &bytes).await
    }
}

/// Replaces `path` with `bytes` through a synced sibling temp file.
pub(crate) async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_error = |what: &str, target: &Path, err: std::io::Error| {
        StoreError::StorageWrite(format!("{} '{}': {}", what, target.display(), err))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| write_error("Failed to create directory", parent, err))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|err| write_error("Failed to create temp file", &tmp, err))?;
    file.write_all(bytes)
        .await
        .map_err(|err| write_error("Failed to write temp file", &tmp, err))?;
    file.sync_all()
        .await
        .map_err(|err| write_error("Failed to sync temp file", &tmp, err))?;
    drop(file);

    fs::rename(&tmp, path)
        .await
        .map_err(|err| write_error("Failed to replace", path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = FileStorageAdapter::new(temp_dir.path().join("state.json"));
        assert!(adapter.is_available().await);
        assert!(adapter.get(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = FileStorageAdapter::new(temp_dir.path().join("nested/state.json"));

        let mut entries = StateMap::new();
        entries.insert("meta".to_string(), json!({"version": 3}));
        adapter.set(entries).await.unwrap();

        let mut more = StateMap::new();
        more.insert("data".to_string(), json!({"A": 1}));
        adapter.set(more).await.unwrap();

        let all = adapter.get(None).await.unwrap();
        assert_eq!(all.get("meta"), Some(&json!({"version": 3})));
        assert_eq!(all.get("data"), Some(&json!({"A": 1})));
        assert!(!temp_dir.path().join("nested/state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_garbage_file_is_read_failure() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();

        let adapter = FileStorageAdapter::new(&path);
        let err = adapter.get(None).await.unwrap_err();
        assert_eq!(err.kind(), "StorageReadFailure");
    }

    #[tokio::test]
    async fn test_unreadable_path_is_read_failure() {
        let temp_dir = TempDir::new().unwrap();
        // a directory cannot be read as a document, unlike a missing file
        let adapter = FileStorageAdapter::new(temp_dir.path());
        let err = adapter.get(None).await.unwrap_err();
        assert_eq!(err.kind(), "StorageReadFailure");
    }

    #[tokio::test]
    async fn test_set_replaces_garbage_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();

        let adapter = FileStorageAdapter::new(&path);
        let mut entries = StateMap::new();
        entries.insert("data".to_string(), json!({"A": 1}));
        adapter.set(entries).await.unwrap();

        let all = adapter.get(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("data"), Some(&json!({"A": 1})));
    }
}
