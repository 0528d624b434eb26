//! In-memory tables and the planning of row mutations.
//!
//! Every mutation is first planned into a [`JournalRecord`] against the
//! current tables, then applied. Replay applies the same records, so a
//! reopened store ends up in exactly the state it acknowledged.

use super::record::JournalRecord;
use super::{Committed, EntryMutation};
use crate::types::{Change, ChangeAction, Entry, Share, UploadSession};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub(crate) struct Tables {
    entries: BTreeMap<String, Entry>,
    changes: Vec<Change>,
    last_change_id: u64,
    uploads: HashMap<String, UploadSession>,
    shares: HashMap<String, Share>,
}

impl Tables {
    pub(crate) fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::PutEntry { entry } => {
                self.entries.insert(entry.rel_path.clone(), entry);
            }
            JournalRecord::AppendChange { change } => self.push_change(change),
            JournalRecord::Commit { entry, change } => {
                self.entries.insert(entry.rel_path.clone(), entry);
                self.push_change(change);
            }
            JournalRecord::PutUpload { session } => {
                self.uploads.insert(session.upload_id.clone(), session);
            }
            JournalRecord::AdvanceUpload {
                upload_id,
                received_bytes,
                updated_at,
            } => {
                if let Some(session) = self.uploads.get_mut(&upload_id) {
                    session.received_bytes = received_bytes;
                    session.updated_at = updated_at;
                }
            }
            JournalRecord::RemoveUpload { upload_id } => {
                self.uploads.remove(&upload_id);
            }
            JournalRecord::PutShare { share } => {
                self.shares.insert(share.token.clone(), share);
            }
            JournalRecord::RemoveShare { token } => {
                self.shares.remove(&token);
            }
        }
    }

    fn push_change(&mut self, change: Change) {
        self.last_change_id = self.last_change_id.max(change.change_id);
        self.changes.push(change);
    }

    pub(crate) fn next_change_id(&self) -> u64 {
        self.last_change_id + 1
    }

    pub(crate) fn last_change_id(&self) -> u64 {
        self.last_change_id
    }

    pub(crate) fn entry(&self, rel_path: &str) -> Option<&Entry> {
        self.entries.get(rel_path)
    }

    pub(crate) fn live_entries_under(&self, prefix: Option<&str>) -> Vec<Entry> {
        match prefix {
            None => self
                .entries
                .values()
                .filter(|e| e.is_live())
                .cloned()
                .collect(),
            Some(prefix) => {
                let start = format!("{prefix}/");
                self.entries
                    .range(start.clone()..)
                    .take_while(|(path, _)| path.starts_with(&start))
                    .map(|(_, e)| e)
                    .filter(|e| e.is_live())
                    .cloned()
                    .collect()
            }
        }
    }

    pub(crate) fn changes_since(&self, cursor: u64, limit: usize) -> Vec<Change> {
        let start = self.changes.partition_point(|c| c.change_id <= cursor);
        self.changes[start..].iter().take(limit).cloned().collect()
    }

    pub(crate) fn upload(&self, upload_id: &str) -> Option<&UploadSession> {
        self.uploads.get(upload_id)
    }

    pub(crate) fn uploads_idle_since(&self, cutoff: DateTime<Utc>) -> Vec<UploadSession> {
        let mut idle: Vec<_> = self
            .uploads
            .values()
            .filter(|s| s.updated_at < cutoff)
            .cloned()
            .collect();
        idle.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        idle
    }

    pub(crate) fn share(&self, token: &str) -> Option<&Share> {
        self.shares.get(token)
    }

    /// Plans the entry and change rows for a committed mutation.
    pub(crate) fn plan_commit(
        &self,
        rel_path: &str,
        mutation: EntryMutation,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> (JournalRecord, Committed) {
        let previous = self.entries.get(rel_path).cloned();
        let rev = previous.as_ref().map_or(1, |e| e.rev + 1);
        let is_dir = previous.as_ref().is_some_and(|e| e.is_dir);

        let (entry, change) = match mutation {
            EntryMutation::Upsert {
                size,
                mtime,
                content_hash,
                storage_location,
            } => {
                let entry = Entry {
                    rel_path: rel_path.to_string(),
                    is_dir,
                    rev,
                    size,
                    mtime,
                    content_hash: Some(content_hash),
                    storage_location: Some(storage_location),
                    deleted: false,
                    deleted_rev: None,
                    deleted_size: None,
                    deleted_hash: None,
                    updated_at: now,
                };
                let change = Change {
                    change_id: self.next_change_id(),
                    rel_path: rel_path.to_string(),
                    action: ChangeAction::Upsert,
                    is_dir,
                    rev,
                    size: Some(size),
                    mtime: Some(mtime),
                    content_hash: Some(content_hash),
                    deleted_size: None,
                    deleted_hash: None,
                    device_id: device_id.map(str::to_string),
                    created_at: now,
                };
                (entry, change)
            }
            EntryMutation::Delete => {
                // Snapshot the last live state; a repeated delete carries the
                // snapshot forward from the existing tombstone.
                let (deleted_size, deleted_hash) = match &previous {
                    Some(e) if e.is_live() => (Some(e.size), e.content_hash),
                    Some(e) => (e.deleted_size, e.deleted_hash),
                    None => (None, None),
                };
                let entry = Entry {
                    rel_path: rel_path.to_string(),
                    is_dir,
                    rev,
                    size: 0,
                    mtime: previous.as_ref().map_or(0, |e| e.mtime),
                    content_hash: None,
                    storage_location: None,
                    deleted: true,
                    deleted_rev: Some(rev),
                    deleted_size,
                    deleted_hash,
                    updated_at: now,
                };
                let change = Change {
                    change_id: self.next_change_id(),
                    rel_path: rel_path.to_string(),
                    action: ChangeAction::Delete,
                    is_dir,
                    rev,
                    size: None,
                    mtime: None,
                    content_hash: None,
                    deleted_size,
                    deleted_hash,
                    device_id: device_id.map(str::to_string),
                    created_at: now,
                };
                (entry, change)
            }
        };

        let record = JournalRecord::Commit {
            entry: entry.clone(),
            change: change.clone(),
        };
        (
            record,
            Committed {
                entry,
                change,
                previous,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn upsert(size: u64) -> EntryMutation {
        EntryMutation::Upsert {
            size,
            mtime: 7,
            content_hash: 42,
            storage_location: PathBuf::from("/srv/files/a"),
        }
    }

    fn commit(tables: &mut Tables, path: &str, mutation: EntryMutation) -> Committed {
        let (record, committed) = tables.plan_commit(path, mutation, Some("dev"), Utc::now());
        tables.apply(record);
        committed
    }

    #[test]
    fn revisions_and_change_ids_advance() {
        let mut tables = Tables::default();
        let first = commit(&mut tables, "a", upsert(3));
        let second = commit(&mut tables, "b", upsert(4));
        let third = commit(&mut tables, "a", upsert(5));

        assert_eq!(first.entry.rev, 1);
        assert_eq!(second.entry.rev, 1);
        assert_eq!(third.entry.rev, 2);
        assert_eq!(
            [first.change.change_id, second.change.change_id, third.change.change_id],
            [1, 2, 3]
        );
        assert_eq!(tables.last_change_id(), 3);
    }

    #[test]
    fn delete_snapshots_last_live_state() {
        let mut tables = Tables::default();
        commit(&mut tables, "a", upsert(9));
        let deleted = commit(&mut tables, "a", EntryMutation::Delete);

        assert!(deleted.entry.deleted);
        assert_eq!(deleted.entry.rev, 2);
        assert_eq!(deleted.entry.deleted_rev, Some(2));
        assert_eq!(deleted.entry.deleted_size, Some(9));
        assert_eq!(deleted.entry.deleted_hash, Some(42));
        assert_eq!(deleted.entry.storage_location, None);
        assert_eq!(deleted.change.action, ChangeAction::Delete);
        assert_eq!(deleted.change.size, None);
        assert!(!deleted.was_absent());

        let again = commit(&mut tables, "a", EntryMutation::Delete);
        assert_eq!(again.entry.rev, 3);
        assert_eq!(again.change.deleted_size, Some(9));
        assert!(again.was_absent());
    }

    #[test]
    fn changes_since_is_exclusive_and_limited() {
        let mut tables = Tables::default();
        for name in ["a", "b", "c", "d"] {
            commit(&mut tables, name, upsert(1));
        }
        let ids: Vec<u64> = tables.changes_since(1, 2).iter().map(|c| c.change_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(tables.changes_since(4, 10).is_empty());
    }

    #[test]
    fn live_entries_respect_segment_boundary() {
        let mut tables = Tables::default();
        for name in ["a/x", "a/y/z", "ab/q", "a"] {
            commit(&mut tables, name, upsert(1));
        }
        commit(&mut tables, "a/y/z", EntryMutation::Delete);

        let under: Vec<String> = tables
            .live_entries_under(Some("a"))
            .into_iter()
            .map(|e| e.rel_path)
            .collect();
        assert_eq!(under, vec!["a/x".to_string()]);
        assert_eq!(tables.live_entries_under(None).len(), 3);
    }
}
