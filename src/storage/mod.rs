//! Threshold storage subsystem.
//!
//! [`ThresholdStorage`] presents one logical append-only sink plus a
//! corresponding readable source, backed transparently by an in-memory buffer
//! or, once the size threshold is crossed, by a secondary resource supplied
//! through the [`SpillBackend`] capability. [`FileBackend`] is the filesystem
//! implementation; [`FileStorage`] the ready-made file-backed storage.
//!
//! # Design Principles
//!
//! - One memory tier, one secondary tier; migration happens exactly once per
//!   lifecycle segment and moves everything
//! - Writes append across the memory/file boundary; reads never change state
//! - The backend is an injected capability, not a subclassing point
//! - No durability contract: nothing here fsyncs

mod backend;
mod engine;
mod errors;
mod file;

pub use backend::SpillBackend;
pub use engine::{
    FileStorage, ReadHandle, ThresholdStorage, WriteHandle, DEFAULT_THRESHOLD, MAX_THRESHOLD,
};
pub use errors::{StorageError, StorageResult};
pub use file::FileBackend;
