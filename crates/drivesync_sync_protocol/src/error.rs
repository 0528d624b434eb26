//! Error types for protocol parsing.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while parsing protocol values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A CRC32 was not a decimal unsigned 32-bit integer.
    #[error("invalid crc32: {value:?}")]
    InvalidCrc32 {
        /// The rejected text.
        value: String,
    },

    /// A byte range cannot be served for a file of the given size.
    #[error("range not satisfiable for size {size}")]
    RangeNotSatisfiable {
        /// Size of the file.
        size: u64,
    },
}
