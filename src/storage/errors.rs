//! Error surface for the storage engine.
//!
//! Every I/O failure (opening, writing, reading or copying into the backing
//! resource) funnels into the single [`StorageError::Io`] kind with the
//! original `io::Error` attached, so callers match on one variant instead of
//! the raw stream errors. Construction problems fail fast with
//! [`StorageError::InvalidThreshold`] and never produce a storage object.

use std::io;

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by storage construction and I/O.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Threshold outside `0 ..= MAX_THRESHOLD`, rejected at construction.
    #[error("size threshold {0} out of range (max {max})", max = crate::storage::MAX_THRESHOLD)]
    InvalidThreshold(usize),

    /// Failure in the secondary resource or a transfer into/out of the storage.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// `read_string` found contents that are not valid UTF-8.
    #[error("stored bytes are not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl StorageError {
    /// Wraps an `io::Error` with a message describing the failed operation.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }

    /// Converts into an `io::Error` for use inside `std::io` trait impls,
    /// keeping the original kind and the full error chain.
    pub(crate) fn into_io(self) -> io::Error {
        let kind = match &self {
            StorageError::Io { source, .. } => source.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, self)
    }
}
