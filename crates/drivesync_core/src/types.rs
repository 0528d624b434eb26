//! Core type definitions for DriveSync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The current state of one path, live or tombstoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Normalized path, the stable identity.
    pub rel_path: String,
    /// Legacy flag; directories are derived from file paths on read.
    pub is_dir: bool,
    /// Per-path revision, bumped by every accepted write or delete.
    pub rev: u64,
    /// Size in bytes (0 when deleted).
    pub size: u64,
    /// Client-supplied modification time, seconds since the epoch.
    pub mtime: u64,
    /// CRC32 of the stored bytes.
    pub content_hash: Option<u32>,
    /// Absolute location of the blob; `None` when deleted.
    pub storage_location: Option<PathBuf>,
    /// Tombstone flag.
    pub deleted: bool,
    /// Revision at which the entry was deleted.
    pub deleted_rev: Option<u64>,
    /// Size of the last live state.
    pub deleted_size: Option<u64>,
    /// Hash of the last live state.
    pub deleted_hash: Option<u32>,
    /// Last time the row was written.
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// Returns true if the entry is not a tombstone.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// Kind of mutation recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// File content was written.
    Upsert,
    /// The path was deleted.
    Delete,
}

impl ChangeAction {
    /// Returns the wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChangeAction::Upsert => "upsert",
            ChangeAction::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable change log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Global cursor position, assigned by the store.
    pub change_id: u64,
    /// Path the change applies to.
    pub rel_path: String,
    /// What happened.
    pub action: ChangeAction,
    /// Legacy directory flag of the entry.
    pub is_dir: bool,
    /// Entry revision after this change.
    pub rev: u64,
    /// Size after an upsert.
    pub size: Option<u64>,
    /// Modification time after an upsert.
    pub mtime: Option<u64>,
    /// Hash after an upsert.
    pub content_hash: Option<u32>,
    /// Size of the state removed by a delete.
    pub deleted_size: Option<u64>,
    /// Hash of the state removed by a delete.
    pub deleted_hash: Option<u32>,
    /// Device that caused the change.
    pub device_id: Option<String>,
    /// When the change was recorded.
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Created by init, nothing received yet.
    Pending,
    /// At least one chunk accepted.
    Receiving,
}

/// Server-side state of one in-flight chunked upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Opaque, server-generated id.
    pub upload_id: String,
    /// Destination the client asked for.
    pub rel_path: String,
    /// Destination actually used after conflict resolution.
    pub decided_path: String,
    /// Revision the client believed current at init.
    pub base_rev: u64,
    /// Declared size in bytes.
    pub size: u64,
    /// Declared modification time.
    pub mtime: u64,
    /// Declared CRC32, if the client sent one.
    pub content_hash: Option<u32>,
    /// Contiguous bytes accepted so far.
    pub received_bytes: u64,
    /// Spool file holding the received bytes.
    pub spool_path: PathBuf,
    /// Uploading device.
    pub device_id: Option<String>,
    /// When init ran.
    pub created_at: DateTime<Utc>,
    /// Last accepted chunk (or init).
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> UploadState {
        if self.received_bytes == 0 {
            UploadState::Pending
        } else {
            UploadState::Receiving
        }
    }

    /// Returns true once every declared byte has arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received_bytes == self.size
    }
}

/// A scoped, password-gated, optionally expiring anonymous grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// Opaque token, the identity of the share.
    pub token: String,
    /// Normalized path the grant covers.
    pub scope_path: String,
    /// Whether the grant covers a subtree rather than one file.
    pub scope_is_dir: bool,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Share {
    /// Returns true if the share has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSummary {
    /// Child name (one segment).
    pub name: String,
    /// Full normalized path of the child.
    pub rel_path: String,
    /// Whether the child is a derived directory.
    pub is_dir: bool,
    /// Revision of the row that introduced the child.
    pub rev: u64,
    /// File size; `None` for directories.
    pub size: Option<u64>,
    /// File mtime; `None` for directories.
    pub mtime: Option<u64>,
    /// File hash; `None` for directories.
    pub content_hash: Option<u32>,
}
