//! # DriveSync Sync Protocol
//!
//! JSON wire types for the DriveSync sync API.
//!
//! This crate provides:
//! - Request and response bodies for every endpoint
//! - [`Crc32`], checksums as decimal strings
//! - [`RangeRequest`], single byte-range parsing for downloads
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod crc;
mod error;
mod messages;
mod range;

pub use crc::Crc32;
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    ChangeRecord, ChangesQuery, ChangesResponse, ChunkQuery, ChunkResponse, DeleteRequest,
    DeleteResponse, FinalizeRequest, FinalizeResponse, InitRequest, InitResponse, ListChild,
    ListResponse, PathQuery, UnlockRequest, UnlockResponse, DUPLICATE_CHUNK_NOTE,
};
pub use range::{unsatisfied_content_range, RangeRequest};
