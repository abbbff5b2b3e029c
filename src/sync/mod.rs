//! Thread-safety decorator for threshold storage.
//!
//! [`SyncStorage`] funnels every operation, including each individual
//! `read`/`write` call on stream handles obtained from it, through one mutex
//! owned by the decorator. Only one participant executes against the
//! underlying storage at a time, so concurrent writes are fully ordered and
//! each write call's bytes land contiguously; the relative order across
//! writers stays arbitrary.
//!
//! Wrapping the handles themselves matters: serializing only the
//! accessor-retrieval calls would still let partial reads and writes on a
//! shared handle race.
//!
//! Locking is per call. A caller holding a handle across several calls gets
//! per-call atomicity, not call-sequence atomicity.

use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::storage::{
    FileBackend, ReadHandle, SpillBackend, StorageResult, ThresholdStorage,
};

/// Decorator making a [`ThresholdStorage`] safe for concurrent callers.
///
/// Cheap to clone; clones share the storage and its mutex. A failure in the
/// delegate propagates unchanged to whichever caller held the lock
/// (`parking_lot` has no poisoning, so errors are never rewritten).
pub struct SyncStorage<B: SpillBackend = FileBackend> {
    inner: Arc<Mutex<ThresholdStorage<B>>>,
}

impl<B: SpillBackend> Clone for SyncStorage<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SpillBackend> SyncStorage<B> {
    /// Wraps the given storage.
    pub fn new(storage: ThresholdStorage<B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Opens a writer whose every call appends under the shared lock.
    pub fn open_writer(&self) -> SyncWriter<B> {
        SyncWriter {
            storage: Arc::clone(&self.inner),
        }
    }

    /// Opens a reader over the current contents; every subsequent `read`
    /// call on it acquires the shared lock.
    pub fn open_reader(&self) -> StorageResult<SyncReader<B>> {
        let handle = self.inner.lock().open_reader()?;
        Ok(SyncReader {
            handle,
            lock: Arc::clone(&self.inner),
        })
    }

    /// Appends the given bytes as one atomic operation.
    pub fn write_bytes(&self, bytes: &[u8]) -> StorageResult<()> {
        self.inner.lock().write_bytes(bytes)
    }

    /// Appends the given string as one atomic operation.
    pub fn write_str(&self, data: &str) -> StorageResult<()> {
        self.inner.lock().write_str(data)
    }

    /// Drains the given reader into the storage under one lock acquisition.
    pub fn write_reader<R: Read + ?Sized>(&self, reader: &mut R) -> StorageResult<()> {
        self.inner.lock().write_reader(reader)
    }

    /// Reads the full contents as one atomic operation.
    pub fn read_bytes(&self) -> StorageResult<Vec<u8>> {
        self.inner.lock().read_bytes()
    }

    /// Reads the full contents as a UTF-8 string, atomically.
    pub fn read_string(&self) -> StorageResult<String> {
        self.inner.lock().read_string()
    }

    /// Current size of the stored data in bytes.
    pub fn size(&self) -> StorageResult<u64> {
        self.inner.lock().size()
    }

    /// Whether contents have migrated to the secondary resource.
    pub fn is_spilled(&self) -> bool {
        self.inner.lock().is_spilled()
    }

    /// Resets the storage to an empty buffering state.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Recovers the wrapped storage if this is the last clone and no handles
    /// are outstanding; otherwise hands `self` back.
    pub fn into_inner(self) -> Result<ThresholdStorage<B>, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

/// Writer over a [`SyncStorage`]; each call locks for its full duration.
pub struct SyncWriter<B: SpillBackend> {
    storage: Arc<Mutex<ThresholdStorage<B>>>,
}

impl<B: SpillBackend> Write for SyncWriter<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut storage = self.storage.lock();
        storage.open_writer().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut storage = self.storage.lock();
        storage.open_writer().flush()
    }
}

/// Reader over a [`SyncStorage`]; each call locks for its full duration.
///
/// The handle itself was resolved when [`SyncStorage::open_reader`] was
/// called; the lock keeps each `read` atomic relative to every other
/// decorated operation.
pub struct SyncReader<B: SpillBackend> {
    handle: ReadHandle<B>,
    lock: Arc<Mutex<ThresholdStorage<B>>>,
}

impl<B: SpillBackend> Read for SyncReader<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let _guard = self.lock.lock();
        self.handle.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use tempfile::TempDir;

    use super::*;
    use crate::storage::FileStorage;

    fn sync_storage(threshold: usize, dir: &TempDir) -> SyncStorage {
        SyncStorage::new(
            FileStorage::with_threshold_and_file(threshold, dir.path().join("spill.bin")).unwrap(),
        )
    }

    #[test]
    fn delegates_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = sync_storage(10, &dir);

        storage.write_str("These are some nice bytes").unwrap();

        assert!(storage.is_spilled());
        assert_eq!(storage.read_string().unwrap(), "These are some nice bytes");
        assert_eq!(storage.size().unwrap(), 25);
    }

    #[test]
    fn clones_share_contents() {
        let dir = TempDir::new().unwrap();
        let storage = sync_storage(1000, &dir);
        let other = storage.clone();

        storage.write_str("left").unwrap();
        other.write_str(" right").unwrap();

        assert_eq!(storage.read_string().unwrap(), "left right");
    }

    #[test]
    fn stream_handles_append_and_read() {
        let dir = TempDir::new().unwrap();
        let storage = sync_storage(10, &dir);

        storage.open_writer().write_all(b"These are some").unwrap();
        storage.open_writer().write_all(b" nice bytes").unwrap();

        let mut contents = Vec::new();
        storage
            .open_reader()
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert_eq!(contents, b"These are some nice bytes");
    }

    #[test]
    fn clear_through_decorator() {
        let dir = TempDir::new().unwrap();
        let storage = sync_storage(10, &dir);

        storage.write_str("These are some nice bytes").unwrap();
        storage.clear();
        storage.clear();

        assert!(!storage.is_spilled());
        assert_eq!(storage.read_bytes().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn into_inner_recovers_storage() {
        let dir = TempDir::new().unwrap();
        let storage = sync_storage(1000, &dir);
        storage.write_str("Hello").unwrap();

        let Ok(mut inner) = storage.into_inner() else {
            panic!("expected the last handle to recover the storage");
        };
        assert_eq!(inner.read_string().unwrap(), "Hello");
    }

    #[test]
    fn into_inner_fails_while_shared() {
        let dir = TempDir::new().unwrap();
        let storage = sync_storage(1000, &dir);
        let _other = storage.clone();

        assert!(storage.into_inner().is_err());
    }
}
