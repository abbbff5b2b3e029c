//! Secondary-storage capability consumed by the engine.

use std::io::{Read, Write};

use super::errors::StorageResult;

/// Backing resource for spilled data.
///
/// The engine is generic over this trait so the spill target can be anything
/// that hands out an append sink and a read source over the same resource:
/// a filesystem path ([`FileBackend`](super::FileBackend)), an object store,
/// a test double. Opening the write side must append to existing contents,
/// never truncate, since the engine reopens the sink after every reader handout.
pub trait SpillBackend {
    /// Write endpoint over the resource, opened in append mode.
    type Sink: Write;
    /// Read endpoint over the resource, positioned at the start.
    type Source: Read;

    /// Opens the resource for appending, creating it if absent.
    fn open_write(&self) -> StorageResult<Self::Sink>;

    /// Opens the resource for reading from the beginning.
    fn open_read(&self) -> StorageResult<Self::Source>;

    /// Whether the resource currently exists.
    fn exists(&self) -> bool;

    /// Removes the resource. Absence is not an error.
    fn delete(&self) -> StorageResult<()>;

    /// Current size of the resource in bytes.
    fn len(&self) -> StorageResult<u64>;
}
