//! Metadata persistence.
//!
//! The engine only needs row-level primitives over four tables (entries,
//! changes, upload sessions, shares) plus one transactional operation,
//! [`MetaStore::commit`], that bumps a path's revision, writes its entry and
//! appends the matching change under a single serialization point. That is
//! what keeps per-path revisions strictly increasing and change ids
//! gap-free for cursoring readers.
//!
//! [`MetaDb`] is the bundled implementation: tables in memory, optionally
//! backed by an append-only journal that is replayed on open.

mod db;
mod record;
mod tables;

pub use db::MetaDb;

use crate::error::CoreResult;
use crate::types::{Change, Entry, Share, UploadSession};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// The state change [`MetaStore::commit`] applies to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMutation {
    /// New live content.
    Upsert {
        /// Size in bytes.
        size: u64,
        /// Client modification time.
        mtime: u64,
        /// CRC32 of the content.
        content_hash: u32,
        /// Where the blob now lives.
        storage_location: PathBuf,
    },
    /// Tombstone the path.
    Delete,
}

/// Result of a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// The entry as written.
    pub entry: Entry,
    /// The change appended alongside it.
    pub change: Change,
    /// The entry as it was before, if any.
    pub previous: Option<Entry>,
}

impl Committed {
    /// Returns true if the path had no live entry before this commit.
    #[must_use]
    pub fn was_absent(&self) -> bool {
        self.previous.as_ref().is_none_or(|e| e.deleted)
    }
}

/// Row-level metadata storage.
///
/// Implementations must be safe to share between request handlers.
pub trait MetaStore: Send + Sync {
    /// Returns the entry for a path, live or tombstoned.
    fn get_entry(&self, rel_path: &str) -> CoreResult<Option<Entry>>;

    /// Inserts or fully replaces the entry keyed by `entry.rel_path`.
    fn put_entry(&self, entry: Entry) -> CoreResult<()>;

    /// Returns live entries strictly below `prefix` (all live entries for
    /// `None`), ordered by path.
    fn live_entries_under(&self, prefix: Option<&str>) -> CoreResult<Vec<Entry>>;

    /// Appends a change, assigning the next change id, and returns that id.
    fn append_change(&self, change: Change) -> CoreResult<u64>;

    /// Returns up to `limit` changes with `change_id > cursor`, ascending.
    fn changes_since(&self, cursor: u64, limit: usize) -> CoreResult<Vec<Change>>;

    /// Returns the highest assigned change id, or 0.
    fn last_change_id(&self) -> CoreResult<u64>;

    /// Atomically applies `mutation` to `rel_path`: bumps the revision,
    /// writes the entry and appends the change.
    fn commit(
        &self,
        rel_path: &str,
        mutation: EntryMutation,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Committed>;

    /// Stores a new upload session.
    fn insert_upload(&self, session: UploadSession) -> CoreResult<()>;

    /// Looks up an upload session.
    fn get_upload(&self, upload_id: &str) -> CoreResult<Option<UploadSession>>;

    /// Moves a session's watermark from `from` to `to`.
    ///
    /// Returns false, without writing, if the session is gone or its
    /// watermark is no longer `from`.
    fn advance_upload(
        &self,
        upload_id: &str,
        from: u64,
        to: u64,
        now: DateTime<Utc>,
    ) -> CoreResult<bool>;

    /// Removes and returns an upload session.
    fn remove_upload(&self, upload_id: &str) -> CoreResult<Option<UploadSession>>;

    /// Returns sessions last updated before `cutoff`.
    fn uploads_idle_since(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<UploadSession>>;

    /// Stores a share. Returns false if the token is already taken.
    fn insert_share(&self, share: Share) -> CoreResult<bool>;

    /// Looks up a share by token.
    fn get_share(&self, token: &str) -> CoreResult<Option<Share>>;

    /// Deletes a share. Returns false if it did not exist.
    fn remove_share(&self, token: &str) -> CoreResult<bool>;
}
