//! spillstore - spill-to-disk data storage
//!
//! Buffers written data in memory while small and transparently migrates it
//! to a backing file once a size threshold is crossed, so callers never
//! decide up front whether a payload is "small" or "large". Wrap a storage in
//! [`sync::SyncStorage`] to share it across threads.

pub mod storage;
pub mod sync;

pub use storage::{
    FileBackend, FileStorage, SpillBackend, StorageError, StorageResult, ThresholdStorage,
};
pub use sync::SyncStorage;
