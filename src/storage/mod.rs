pub mod adapter;
pub mod file;
pub mod marker;
pub mod memory;

pub use adapter::StorageAdapter;
pub use file::FileStorageAdapter;
pub use marker::{FileMarkerStore, MarkerStore, MemoryMarkerStore, ReadOnlyMarkerStore};
pub use memory::MemoryStorageAdapter;
