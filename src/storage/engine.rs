//! Threshold storage engine.
//!
//! Data accumulates in an in-memory buffer until a write would bring the
//! cumulative size to the configured threshold; that write triggers a one-time
//! migration of everything buffered so far into the secondary resource, and
//! every later write in the lifecycle segment appends there directly.
//!
//! # Invariants Enforced
//!
//! - Contents are recoverable entirely from memory or entirely from the
//!   secondary resource, never split across both and never duplicated
//! - Migration fires at most once per segment; the whole buffer is flushed
//!   before the triggering payload is appended
//! - The threshold comparison is against the size *after* the pending write
//!   (`>=`): writing exactly `threshold` bytes migrates, one byte less does not
//! - Reads never change state; `clear()` is the only way back to buffering

use std::io::{self, Cursor, Read, Write};

use tracing::{debug, warn};

use super::backend::SpillBackend;
use super::errors::{StorageError, StorageResult};
use super::file::FileBackend;

/// Default size threshold: 5 MB, matching typical "keep small payloads off
/// disk" usage.
pub const DEFAULT_THRESHOLD: usize = 5_000_000;

/// Largest accepted threshold. The margin keeps the post-write size
/// projection from overflowing when a write's length is added.
pub const MAX_THRESHOLD: usize = usize::MAX - 8;

/// Transfer buffer size for the stream-copy convenience operations.
const COPY_BUF_SIZE: usize = 8 * 1024;

/// Data storage that buffers in memory and spills to secondary storage once
/// cumulative size reaches a threshold.
///
/// Writes append; multiple writers opened over the lifetime of the object all
/// feed the same logical contents. `clear()` resets to an empty buffering
/// state and removes the secondary resource, starting a new lifecycle
/// segment.
///
/// Not safe for concurrent use; every operation takes `&mut self`. Wrap in
/// [`SyncStorage`](crate::sync::SyncStorage) to share across threads.
pub struct ThresholdStorage<B: SpillBackend = FileBackend> {
    /// Secondary-storage capability; spill target for this instance.
    backend: B,
    /// Immutable size threshold in bytes.
    threshold: usize,
    /// In-memory accumulator; emptied and freed on migration.
    buffer: Vec<u8>,
    /// Whether migration has occurred in this lifecycle segment.
    spilled: bool,
    /// Engine-owned append handle, open between a spilled write and the next
    /// reader handout.
    sink: Option<B::Sink>,
}

impl<B: SpillBackend> ThresholdStorage<B> {
    /// Creates a storage over the given backend.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidThreshold`] if `threshold` exceeds
    /// [`MAX_THRESHOLD`].
    pub fn with_backend(threshold: usize, backend: B) -> StorageResult<Self> {
        if threshold > MAX_THRESHOLD {
            return Err(StorageError::InvalidThreshold(threshold));
        }
        Ok(Self {
            backend,
            threshold,
            buffer: Vec::new(),
            spilled: false,
            sink: None,
        })
    }

    /// Whether contents have migrated to the secondary resource.
    pub fn is_spilled(&self) -> bool {
        self.spilled
    }

    /// The configured size threshold in bytes.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The backing capability.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Opens a writer appending to the current contents.
    ///
    /// Every write routes through the shared append logic and may trigger
    /// migration. The handle borrows the storage exclusively; close is
    /// implicit on drop (the engine keeps its own secondary handle open until
    /// the next reader is requested).
    pub fn open_writer(&mut self) -> WriteHandle<'_, B> {
        WriteHandle { storage: self }
    }

    /// Opens a reader over the current contents.
    ///
    /// While buffering this is a snapshot of the bytes at call time; writes
    /// after the call are not visible through the handle. Once spilled, the
    /// engine first flushes and closes its own append handle so the reader
    /// never observes a partially-flushed secondary resource.
    ///
    /// Reading an empty storage yields zero bytes, not an error.
    pub fn open_reader(&mut self) -> StorageResult<ReadHandle<B>> {
        let inner = if self.spilled {
            self.close_sink()?;
            ReadInner::Secondary(self.backend.open_read()?)
        } else {
            ReadInner::Memory(Cursor::new(self.buffer.clone()))
        };
        Ok(ReadHandle { inner })
    }

    /// Appends the given bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> StorageResult<()> {
        self.write_chunk(bytes)
    }

    /// Appends the given string as UTF-8 bytes.
    pub fn write_str(&mut self, data: &str) -> StorageResult<()> {
        self.write_chunk(data.as_bytes())
    }

    /// Drains the given reader into the storage.
    ///
    /// The reader is consumed to end-of-data but not closed; transfer
    /// failures on either side surface as [`StorageError::Io`].
    pub fn write_reader<R: Read + ?Sized>(&mut self, reader: &mut R) -> StorageResult<()> {
        let mut buf = [0u8; COPY_BUF_SIZE];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| StorageError::io("failed to read from source stream", e))?;
            if n == 0 {
                return Ok(());
            }
            self.write_chunk(&buf[..n])?;
        }
    }

    /// Reads the full contents as a byte vector.
    pub fn read_bytes(&mut self) -> StorageResult<Vec<u8>> {
        let mut reader = self.open_reader()?;
        let mut contents = Vec::new();
        reader
            .read_to_end(&mut contents)
            .map_err(|e| StorageError::io("failed to drain storage contents", e))?;
        Ok(contents)
    }

    /// Reads the full contents as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// [`StorageError::Utf8`] if the stored bytes are not valid UTF-8.
    pub fn read_string(&mut self) -> StorageResult<String> {
        Ok(String::from_utf8(self.read_bytes()?)?)
    }

    /// Current size of the stored data in bytes.
    ///
    /// Buffer length while buffering; backend-reported length once spilled
    /// (the engine's append handle is flushed first so the figure is current).
    pub fn size(&mut self) -> StorageResult<u64> {
        if self.spilled {
            if let Some(sink) = self.sink.as_mut() {
                sink.flush()
                    .map_err(|e| StorageError::io("failed to flush secondary handle", e))?;
            }
            self.backend.len()
        } else {
            Ok(self.buffer.len() as u64)
        }
    }

    /// Resets the storage to an empty buffering state.
    ///
    /// Closes the secondary handle, discards buffered bytes and deletes the
    /// secondary resource. Deletion is best-effort: a failure is logged and
    /// swallowed since the contents are being discarded anyway. Idempotent.
    ///
    /// Readers and writers obtained before `clear()` must not be used after.
    pub fn clear(&mut self) {
        self.sink = None;
        self.spilled = false;
        self.buffer = Vec::new();
        if let Err(e) = self.backend.delete() {
            warn!(error = %e, "failed to delete secondary resource during clear");
        }
    }

    /// Shared append logic behind every write path.
    fn write_chunk(&mut self, bytes: &[u8]) -> StorageResult<()> {
        if self.spilled {
            return self.write_secondary(bytes);
        }
        // Size after the pending write; saturates only past any real buffer
        // size, which still compares >= threshold.
        let projected = self.buffer.len().saturating_add(bytes.len());
        if projected >= self.threshold {
            self.migrate()?;
            self.write_secondary(bytes)
        } else {
            self.buffer.extend_from_slice(bytes);
            Ok(())
        }
    }

    /// One-time migration: flush the whole buffer into a fresh append sink.
    ///
    /// The spilled flag flips only after the whole buffer lands, so a failed
    /// migration leaves the storage buffering and the write retryable. A
    /// partial flush may have reached the resource before the error; it is
    /// removed so the retried migration appends to an empty resource instead
    /// of duplicating the prefix.
    fn migrate(&mut self) -> StorageResult<()> {
        let mut sink = self.backend.open_write()?;
        if !self.buffer.is_empty() {
            if let Err(e) = sink.write_all(&self.buffer) {
                drop(sink);
                if let Err(del) = self.backend.delete() {
                    warn!(error = %del, "failed to remove partially migrated data");
                }
                return Err(StorageError::io(
                    "failed to migrate buffered data to secondary storage",
                    e,
                ));
            }
        }
        debug!(
            buffered = self.buffer.len(),
            threshold = self.threshold,
            "size threshold reached, migrating to secondary storage"
        );
        self.buffer = Vec::new();
        self.spilled = true;
        self.sink = Some(sink);
        Ok(())
    }

    /// Appends directly to the secondary resource, reopening the engine's
    /// handle if a reader handout closed it.
    fn write_secondary(&mut self, bytes: &[u8]) -> StorageResult<()> {
        if self.sink.is_none() {
            self.sink = Some(self.backend.open_write()?);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(bytes)
                .map_err(|e| StorageError::io("failed to write to secondary storage", e))?;
        }
        Ok(())
    }

    /// Flushes and drops the engine-owned append handle.
    fn close_sink(&mut self) -> StorageResult<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.flush()
                .map_err(|e| StorageError::io("failed to flush secondary handle", e))?;
        }
        Ok(())
    }
}

impl<B: SpillBackend> Drop for ThresholdStorage<B> {
    /// Dropping the storage releases everything it holds, including the
    /// secondary resource.
    fn drop(&mut self) {
        self.clear();
    }
}

/// File-backed storage, the common specialization.
pub type FileStorage = ThresholdStorage<FileBackend>;

impl ThresholdStorage<FileBackend> {
    /// Storage with the default 5 MB threshold spilling to an
    /// engine-generated temp path.
    pub fn new() -> StorageResult<Self> {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    /// Storage spilling to an engine-generated temp path past `threshold`
    /// bytes.
    pub fn with_threshold(threshold: usize) -> StorageResult<Self> {
        Self::with_backend(threshold, FileBackend::temp()?)
    }

    /// Storage with the default threshold spilling to the given file.
    pub fn with_file(path: impl Into<std::path::PathBuf>) -> StorageResult<Self> {
        Self::with_backend(DEFAULT_THRESHOLD, FileBackend::new(path))
    }

    /// Storage spilling to the given file past `threshold` bytes.
    pub fn with_threshold_and_file(
        threshold: usize,
        path: impl Into<std::path::PathBuf>,
    ) -> StorageResult<Self> {
        Self::with_backend(threshold, FileBackend::new(path))
    }
}

/// Writer appending to a [`ThresholdStorage`].
///
/// Each `write` call hands its whole slice to the engine's append logic, so a
/// single call's bytes always land contiguously. The exclusive borrow keeps
/// any other storage operation out while the handle lives.
pub struct WriteHandle<'a, B: SpillBackend> {
    storage: &'a mut ThresholdStorage<B>,
}

impl<B: SpillBackend> Write for WriteHandle<'_, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.storage
            .write_chunk(buf)
            .map(|()| buf.len())
            .map_err(StorageError::into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(sink) = self.storage.sink.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Reader over a [`ThresholdStorage`]'s contents.
///
/// Independent of the storage borrow: a snapshot of the memory buffer, or a
/// fresh source over the secondary resource. Multiple readers may coexist.
pub struct ReadHandle<B: SpillBackend> {
    inner: ReadInner<B>,
}

enum ReadInner<B: SpillBackend> {
    Memory(Cursor<Vec<u8>>),
    Secondary(B::Source),
}

impl<B: SpillBackend> Read for ReadHandle<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            ReadInner::Memory(cursor) => cursor.read(buf),
            ReadInner::Secondary(source) => source.read(buf),
        }
    }
}
