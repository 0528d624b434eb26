//! Error types for the core engine.

use drivesync_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A client-supplied path was rejected.
    #[error("invalid path: {reason}")]
    InvalidPath {
        /// Why the path was rejected.
        reason: String,
    },

    /// Upload metadata (size, mtime, offset, checksum) was invalid.
    #[error("invalid metadata: {message}")]
    InvalidMetadata {
        /// Description of the problem.
        message: String,
    },

    /// No upload session exists for the given id.
    #[error("unknown upload: {upload_id}")]
    UnknownUpload {
        /// The id that was looked up.
        upload_id: String,
    },

    /// A chunk started past the bytes received so far.
    #[error("chunk offset {got} is ahead of received bytes {expected}")]
    OffsetAhead {
        /// Offset the server expects next.
        expected: u64,
        /// Offset the client sent.
        got: u64,
    },

    /// A chunk carried no bytes.
    #[error("empty chunk")]
    EmptyChunk,

    /// A chunk would extend the upload past its declared size.
    #[error("chunk ends at {end}, beyond declared size {size}")]
    ChunkOverflow {
        /// Declared file size.
        size: u64,
        /// End offset the chunk would reach.
        end: u64,
    },

    /// Finalize was called before all bytes arrived.
    #[error("upload incomplete: received {received} of {expected} bytes")]
    IncompleteUpload {
        /// Bytes received so far.
        received: u64,
        /// Declared size.
        expected: u64,
    },

    /// The assembled content does not match the declared CRC32.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Declared checksum.
        expected: u32,
        /// Checksum of the received bytes.
        actual: u32,
    },

    /// Another chunk for the same upload was accepted concurrently.
    #[error("concurrent chunk for upload {upload_id}")]
    ConcurrentChunk {
        /// Upload that saw the race.
        upload_id: String,
    },

    /// The requested entry does not exist or is deleted.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was looked up.
        path: String,
    },

    /// A stored upload session is unusable (missing spool, bad path).
    #[error("upload session {upload_id} is unusable: {reason}")]
    BrokenSession {
        /// Affected upload.
        upload_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The metadata journal is corrupt.
    #[error("journal corruption: {message}")]
    Journal {
        /// Description of the corruption.
        message: String,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// I/O error outside the storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath { reason } => Self::InvalidPath {
                reason: reason.to_string(),
            },
            other => Self::Storage(other),
        }
    }
}

impl CoreError {
    /// Creates an invalid metadata error.
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal(message: impl Into<String>) -> Self {
        Self::Journal {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn broken_session(upload_id: &str, reason: impl Into<String>) -> Self {
        Self::BrokenSession {
            upload_id: upload_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidPath { .. }
                | CoreError::InvalidMetadata { .. }
                | CoreError::UnknownUpload { .. }
                | CoreError::OffsetAhead { .. }
                | CoreError::EmptyChunk
                | CoreError::ChunkOverflow { .. }
                | CoreError::IncompleteUpload { .. }
                | CoreError::ChecksumMismatch { .. }
                | CoreError::ConcurrentChunk { .. }
                | CoreError::NotFound { .. }
        )
    }

    /// Returns true if the error is a server-side failure.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
