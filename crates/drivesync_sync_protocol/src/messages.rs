//! Request and response bodies of the sync API.
//!
//! Field names are part of the wire contract and must not change.

use crate::crc::Crc32;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Note attached to a chunk response that was a retry.
pub const DUPLICATE_CHUNK_NOTE: &str = "duplicate chunk ignored";

/// Query of `GET changes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesQuery {
    /// Cursor; changes with a larger id are returned.
    #[serde(default)]
    pub since: Option<i64>,
    /// Requested page size.
    #[serde(default)]
    pub limit: Option<i64>,
}

/// One change log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Cursor position.
    pub change_id: u64,
    /// Affected path.
    pub rel_path: String,
    /// `"upsert"` or `"delete"`.
    pub action: String,
    /// Legacy directory flag.
    pub is_dir: bool,
    /// Entry revision after the change.
    pub rev: u64,
    /// Size after an upsert.
    pub size: Option<u64>,
    /// Modification time after an upsert.
    pub mtime: Option<u64>,
    /// Checksum after an upsert.
    pub crc32: Option<Crc32>,
    /// Size removed by a delete.
    pub deleted_size: Option<u64>,
    /// Checksum removed by a delete.
    pub deleted_crc32: Option<Crc32>,
    /// Device that made the change.
    pub device_id: Option<String>,
    /// When the change was recorded.
    pub created_at: DateTime<Utc>,
}

/// Response of `GET changes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesResponse {
    /// The page.
    pub changes: Vec<ChangeRecord>,
    /// Cursor for the next call.
    pub next_since: u64,
}

/// Body of `POST upload/init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    /// Destination path.
    pub rel_path: String,
    /// Size in bytes.
    pub size: i64,
    /// Modification time, seconds since the epoch.
    #[serde(default)]
    pub mtime: i64,
    /// Expected checksum of the content.
    #[serde(default)]
    pub crc32: Option<Crc32>,
    /// Revision the client last saw (0 for a new file).
    #[serde(default)]
    pub base_rev: u64,
    /// Opaque device id.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Device name used in conflict paths.
    #[serde(default)]
    pub device_label: Option<String>,
}

/// Response of `POST upload/init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    /// Session id.
    pub upload_id: String,
    /// Where the upload will land.
    pub decided_path: String,
    /// Advisory chunk size.
    pub suggested_chunk_size_mb: u32,
}

/// Query of `POST upload/chunk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkQuery {
    /// Session id.
    pub upload_id: String,
    /// Offset of the first byte of the body.
    pub offset: i64,
}

/// Response of `POST upload/chunk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResponse {
    /// Always true.
    pub ok: bool,
    /// Watermark after the call.
    pub received_bytes: u64,
    /// Set for an ignored retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ChunkResponse {
    /// Response for an accepted chunk.
    #[must_use]
    pub fn accepted(received_bytes: u64) -> Self {
        Self {
            ok: true,
            received_bytes,
            note: None,
        }
    }

    /// Response for a chunk below the watermark.
    #[must_use]
    pub fn duplicate(received_bytes: u64) -> Self {
        Self {
            ok: true,
            received_bytes,
            note: Some(DUPLICATE_CHUNK_NOTE.to_string()),
        }
    }
}

/// Body of `POST upload/finalize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    /// Session id.
    pub upload_id: String,
}

/// Response of `POST upload/finalize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeResponse {
    /// Always true.
    pub ok: bool,
    /// Path the file was committed to.
    pub rel_path: String,
    /// New revision.
    pub rev: u64,
    /// Verified checksum.
    pub crc32: Crc32,
    /// Id of the upsert change.
    pub change_id: u64,
}

/// Body of `POST delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Path to delete.
    pub rel_path: String,
    /// Opaque device id.
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Response of `POST delete`.
///
/// A delete of a live path reports `rel_path` and `rev`; a delete of an
/// absent or already deleted path reports `already_deleted` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Always true.
    pub ok: bool,
    /// Deleted path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_path: Option<String>,
    /// Revision of the tombstone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<u64>,
    /// Id of the delete change.
    pub change_id: u64,
    /// True if nothing live was deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub already_deleted: Option<bool>,
}

/// Query of `GET list` and `GET download`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathQuery {
    /// Target path; for listings, empty means the root (or the share scope).
    #[serde(default)]
    pub path: String,
    /// Share token for anonymous access.
    #[serde(default)]
    pub token: Option<String>,
}

/// One listed child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChild {
    /// Name (one segment).
    pub name: String,
    /// Full path.
    pub rel_path: String,
    /// True for a derived directory.
    pub is_dir: bool,
    /// Revision of the row that introduced the child.
    pub rev: u64,
    /// File size, null for directories.
    pub size: Option<u64>,
    /// File mtime, null for directories.
    pub mtime: Option<u64>,
    /// File checksum, null for directories.
    pub crc32: Option<Crc32>,
}

/// Response of `GET list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Listed directory, empty for the root.
    pub path: String,
    /// Children, directories first.
    pub children: Vec<ListChild>,
}

/// Body of `POST share/unlock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequest {
    /// Share token.
    pub token: String,
    /// Share password.
    pub password: String,
}

/// Response of `POST share/unlock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockResponse {
    /// Always true.
    pub ok: bool,
    /// Signed credential to present on later requests.
    pub credential: String,
    /// Expiry of the credential, seconds since the epoch.
    pub expires_at: i64,
}
