use super::file::atomic_write;
use crate::core::{Result, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// Small durable flag store, kept apart from the state document so it survives
/// the loss of that document.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryMarkerStore {
    markers: RwLock<HashMap<String, String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarkerStore for MemoryMarkerStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.markers.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.markers
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per marker under a directory.
pub struct FileMarkerStore {
    dir: PathBuf,
}

impl FileMarkerStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn marker_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && key != "."
            && key != "..";
        if !valid {
            return Err(StoreError::IoError(format!("Invalid marker key '{}'", key)));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl MarkerStore for FileMarkerStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.marker_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::IoError(format!(
                "Failed to read marker '{}': {}",
                path.display(),
                err
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.marker_path(key)?;
        atomic_write(&path, value.as_bytes()).await
    }
}

/// Reads through to another store and drops every write.
pub struct ReadOnlyMarkerStore<M> {
    inner: M,
}

impl<M: MarkerStore> ReadOnlyMarkerStore<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<M: MarkerStore> MarkerStore for ReadOnlyMarkerStore<M> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, _value: &str) -> Result<()> {
        log::debug!("read-only marker store, not recording '{}'", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_markers() {
        let markers = MemoryMarkerStore::new();
        assert_eq!(markers.get("state_existed").await.unwrap(), None);
        markers.set("state_existed", "1700000000000").await.unwrap();
        assert_eq!(
            markers.get("state_existed").await.unwrap().as_deref(),
            Some("1700000000000")
        );
    }

    #[tokio::test]
    async fn test_file_markers_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        FileMarkerStore::new(temp_dir.path())
            .set("user_opted_in_to_restore", "true")
            .await
            .unwrap();

        let reopened = FileMarkerStore::new(temp_dir.path());
        assert_eq!(
            reopened.get("user_opted_in_to_restore").await.unwrap().as_deref(),
            Some("true")
        );
        assert_eq!(reopened.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_marker_rejects_path_keys() {
        let temp_dir = TempDir::new().unwrap();
        let markers = FileMarkerStore::new(temp_dir.path());
        assert!(markers.set("../escape", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_read_only_markers_drop_writes() {
        let temp_dir = TempDir::new().unwrap();
        FileMarkerStore::new(temp_dir.path())
            .set("state_existed", "1700000000000")
            .await
            .unwrap();

        let markers = ReadOnlyMarkerStore::new(FileMarkerStore::new(temp_dir.path()));
        markers.set("user_opted_in_to_restore", "true").await.unwrap();
        assert_eq!(markers.get("user_opted_in_to_restore").await.unwrap(), None);
        assert_eq!(
            markers.get("state_existed").await.unwrap().as_deref(),
            Some("1700000000000")
        );
        assert!(!temp_dir.path().join("user_opted_in_to_restore").exists());
    }
}
