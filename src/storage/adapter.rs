use crate::core::{Result, StateMap};
use async_trait::async_trait;

/// Raw key-value storage the gateway persists into - allows pluggable storage backends
///
/// Implementations report failures as `StoreError::StorageRead` /
/// `StoreError::StorageWrite` and must resolve rather than hang.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Whether the underlying medium exists at all on this installation
    async fn is_available(&self) -> bool {
        true
    }

    /// Read the given keys, or every stored key when `keys` is `None`
    ///
    /// An empty map is returned when nothing is stored; it is not an error.
    async fn get(&self, keys: Option<&[String]>) -> Result<StateMap>;

    /// Merge the given entries into storage
    async fn set(&self, entries: StateMap) -> Result<()>;
}

/// Keeps only the requested keys of a full read.
pub(crate) fn select_keys(all: &StateMap, keys: Option<&[String]>) -> StateMap {
    match keys {
        None => all.clone(),
        Some(keys) => keys
            .iter()
            .filter_map(|key| all.get(key).map(|value| (key.clone(), value.clone())))
            .collect(),
    }
}
