//! # drivesync storage
//!
//! The lowest layer of drivesync: everything that touches the filesystem.
//!
//! This crate provides:
//! - [`NormalizedPath`], the single choke point for client-supplied paths
//! - [`join_private`], the second traversal check after joining under a root
//! - [`StorageRoot`], the sandboxed tree holding canonical files and upload spools
//! - [`AppendStore`] implementations backing the metadata journal
//! - CRC32 checksums of buffers and files
//!
//! ## Example
//!
//! ```rust
//! use drivesync_storage::NormalizedPath;
//!
//! let p = NormalizedPath::parse("/docs//report.pdf").unwrap();
//! assert_eq!(p.as_str(), "docs/report.pdf");
//! assert!(NormalizedPath::parse("../etc/passwd").is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod append;
mod checksum;
mod error;
mod file;
mod memory;
mod path;
mod root;

pub use append::AppendStore;
pub use checksum::{crc32_of_bytes, crc32_of_file};
pub use error::{StorageError, StorageResult};
pub use file::FileAppendStore;
pub use memory::MemoryAppendStore;
pub use path::{join_private, NormalizedPath, MAX_PATH_LEN};
pub use root::{Cleanup, StorageRoot};
