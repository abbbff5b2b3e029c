//! Filesystem implementation of the spill backend.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::backend::SpillBackend;
use super::errors::{StorageError, StorageResult};

/// Spill backend addressed by a filesystem path.
///
/// The file is only brought into existence by the first [`open_write`]
/// (i.e. the first spill); until then [`exists`] reports `false`.
///
/// [`open_write`]: SpillBackend::open_write
/// [`exists`]: SpillBackend::exists
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend over a caller-supplied path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a backend over a fresh path in the system temp directory.
    ///
    /// Reserves a unique name by creating and immediately removing a temp
    /// file, so the backing file itself does not exist until the first spill.
    ///
    /// The reserved path stays with this backend for its whole lifetime: a
    /// `clear()` on the owning storage deletes the file but the next spill
    /// reuses the same name rather than generating a fresh one.
    pub fn temp() -> StorageResult<Self> {
        let file = tempfile::Builder::new()
            .prefix("spillstore-")
            .tempfile()
            .map_err(|e| StorageError::io("failed to reserve temp backing path", e))?;
        let path = file.path().to_path_buf();
        // Dropping the NamedTempFile removes the placeholder file.
        drop(file);
        Ok(Self { path })
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SpillBackend for FileBackend {
    type Sink = File;
    type Source = File;

    fn open_write(&self) -> StorageResult<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                StorageError::io(
                    format!("failed to open backing file: {}", self.path.display()),
                    e,
                )
            })
    }

    fn open_read(&self) -> StorageResult<File> {
        File::open(&self.path).map_err(|e| {
            StorageError::io(
                format!("failed to read backing file: {}", self.path.display()),
                e,
            )
        })
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn delete(&self) -> StorageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(
                format!("failed to delete backing file: {}", self.path.display()),
                e,
            )),
        }
    }

    fn len(&self) -> StorageResult<u64> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| {
                StorageError::io(
                    format!("failed to stat backing file: {}", self.path.display()),
                    e,
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn temp_backend_reserves_path_without_file() {
        let backend = FileBackend::temp().unwrap();
        assert!(!backend.exists());
        assert!(backend
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("spillstore-"));
    }

    #[test]
    fn open_write_appends_across_handles() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("spill.bin"));

        backend.open_write().unwrap().write_all(b"abc").unwrap();
        backend.open_write().unwrap().write_all(b"def").unwrap();

        let mut contents = Vec::new();
        backend.open_read().unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"abcdef");
        assert_eq!(backend.len().unwrap(), 6);
    }

    #[test]
    fn delete_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("never-created.bin"));
        backend.delete().unwrap();
        backend.delete().unwrap();
    }

    #[test]
    fn open_read_on_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("missing.bin"));
        let err = backend.open_read().unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
