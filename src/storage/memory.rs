use super::adapter::{StorageAdapter, select_keys};
use crate::core::{Result, StateMap, StoreError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-process storage adapter.
///
/// Besides plain storage it can be told to fail upcoming reads or writes and to
/// report itself unavailable, which makes it usable for simulating an unreliable
/// medium. Every call is counted.
pub struct MemoryStorageAdapter {
    entries: RwLock<StateMap>,
    available: AtomicBool,
    pending_read_failures: AtomicUsize,
    pending_write_failures: AtomicUsize,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
}

impl MemoryStorageAdapter {
    pub fn new() -> Self {
        Self::with_entries(StateMap::new())
    }

    pub fn with_entries(entries: StateMap) -> Self {
        Self {
            entries: RwLock::new(entries),
            available: AtomicBool::new(true),
            pending_read_failures: AtomicUsize::new(0),
            pending_write_failures: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
        }
    }

    /// An adapter that reports the medium as missing.
    pub fn unavailable() -> Self {
        let adapter = Self::new();
        adapter.available.store(false, Ordering::SeqCst);
        adapter
    }

    /// Make the next `count` reads fail.
    pub fn fail_next_reads(&self, count: usize) {
        self.pending_read_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.pending_write_failures.store(count, Ordering::SeqCst);
    }

    /// Drop everything stored, as a medium that silently lost its data would.
    pub async fn wipe(&self) {
        self.entries.write().await.clear();
    }

    pub async fn snapshot(&self) -> StateMap {
        self.entries.read().await.clone()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                pending.checked_sub(1)
            })
            .is_ok()
    }
}

impl Default for MemoryStorageAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorageAdapter {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get(&self, keys: Option<&[String]>) -> Result<StateMap> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.pending_read_failures) {
            return Err(StoreError::StorageRead(
                "injected memory adapter read failure".to_string(),
            ));
        }

        let entries = self.entries.read().await;
        Ok(select_keys(&entries, keys))
    }

    async fn set(&self, entries: StateMap) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.pending_write_failures) {
            return Err(StoreError::StorageWrite(
                "injected memory adapter write failure".to_string(),
            ));
        }

        let mut stored = self.entries.write().await;
        for (key, value) in entries {
            stored.insert(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_merges_and_get_filters() {
        let adapter = MemoryStorageAdapter::new();
        let mut first = StateMap::new();
        first.insert("a".to_string(), json!(1));
        first.insert("b".to_string(), json!(2));
        adapter.set(first).await.unwrap();

        let mut second = StateMap::new();
        second.insert("b".to_string(), json!(3));
        adapter.set(second).await.unwrap();

        let all = adapter.get(None).await.unwrap();
        assert_eq!(all.get("a"), Some(&json!(1)));
        assert_eq!(all.get("b"), Some(&json!(3)));

        let only_b = adapter.get(Some(&["b".to_string()])).await.unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(adapter.set_calls(), 2);
        assert_eq!(adapter.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let adapter = MemoryStorageAdapter::new();
        adapter.fail_next_reads(1);
        assert!(adapter.get(None).await.is_err());
        assert!(adapter.get(None).await.is_ok());

        adapter.fail_next_writes(2);
        assert!(adapter.set(StateMap::new()).await.is_err());
        assert!(adapter.set(StateMap::new()).await.is_err());
        assert!(adapter.set(StateMap::new()).await.is_ok());
    }
}
