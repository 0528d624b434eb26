//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A client-supplied relative path was rejected by the normalizer.
    #[error("invalid path: {reason}")]
    InvalidPath {
        /// Why the path was rejected.
        reason: &'static str,
    },

    /// A joined path escaped the sandbox root.
    #[error("path escapes storage root: {}", path.display())]
    OutsideRoot {
        /// The offending absolute path.
        path: PathBuf,
    },

    /// Another process holds the storage root lock.
    #[error("storage root locked: another process has exclusive access")]
    RootLocked,

    /// Attempted to read beyond the end of an append store.
    #[error("read beyond end of store: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current store size.
        size: u64,
    },

    /// Promotion of a spool file into the canonical tree failed.
    #[error("could not move upload into place at {}: {source}", dest.display())]
    Promote {
        /// Final destination.
        dest: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub(crate) fn invalid_path(reason: &'static str) -> Self {
        Self::InvalidPath { reason }
    }

    /// Returns true if the error was caused by client input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StorageError::InvalidPath { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StorageError::invalid_path("empty").is_client_error());
        assert!(!StorageError::RootLocked.is_client_error());
    }

    #[test]
    fn promote_display_names_destination() {
        let err = StorageError::Promote {
            dest: PathBuf::from("/srv/files/a.txt"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("a.txt"));
    }
}
