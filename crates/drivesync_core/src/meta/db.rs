//! The bundled [`MetaStore`] implementation.

use super::record::JournalRecord;
use super::tables::Tables;
use super::{Committed, EntryMutation, MetaStore};
use crate::error::{CoreError, CoreResult};
use crate::types::{Change, Entry, Share, UploadSession};
use chrono::{DateTime, Utc};
use drivesync_storage::{AppendStore, FileAppendStore};
use parking_lot::RwLock;
use std::path::Path;
use tracing::{debug, warn};

/// Metadata tables held in memory, optionally journaled.
///
/// Writers hold the table lock across the journal append, so readers never
/// observe a row before it is durable, and never observe change N before
/// change N-1.
pub struct MetaDb {
    tables: RwLock<Tables>,
    journal: Option<Journal>,
}

struct Journal {
    store: Box<dyn AppendStore>,
    sync_on_commit: bool,
}

impl Journal {
    fn write(&self, record: &JournalRecord) -> CoreResult<()> {
        self.store.append(&record.encode()?)?;
        if self.sync_on_commit {
            self.store.sync()?;
        }
        Ok(())
    }
}

impl MetaDb {
    /// Opens a journaled store at `path`, replaying existing records.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be opened or a complete
    /// record is corrupt.
    pub fn open(path: &Path, sync_on_commit: bool) -> CoreResult<Self> {
        let store = FileAppendStore::open(path)?;
        Self::with_journal(Box::new(store), sync_on_commit)
    }

    /// Creates an ephemeral store with no journal.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            journal: None,
        }
    }

    /// Creates a store over an existing journal, replaying its records.
    ///
    /// A torn final record (no trailing newline) is truncated away.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Journal`] if a complete record is corrupt.
    pub fn with_journal(store: Box<dyn AppendStore>, sync_on_commit: bool) -> CoreResult<Self> {
        let data = store.read_all()?;
        let mut tables = Tables::default();
        let mut good_len = 0usize;
        let mut records = 0usize;

        while good_len < data.len() {
            let rest = &data[good_len..];
            let Some(newline) = rest.iter().position(|&b| b == b'\n') else {
                warn!(
                    offset = good_len,
                    bytes = rest.len(),
                    "discarding torn journal record"
                );
                store.truncate(good_len as u64)?;
                break;
            };
            let record = JournalRecord::decode(&rest[..newline]).map_err(|e| {
                CoreError::journal(format!("record {} at offset {good_len}: {e}", records + 1))
            })?;
            tables.apply(record);
            good_len += newline + 1;
            records += 1;
        }

        debug!(records, "journal replayed");
        Ok(Self {
            tables: RwLock::new(tables),
            journal: Some(Journal {
                store,
                sync_on_commit,
            }),
        })
    }

    /// Returns true if mutations are journaled.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    fn write(&self, tables: &mut Tables, record: JournalRecord) -> CoreResult<()> {
        if let Some(journal) = &self.journal {
            journal.write(&record)?;
        }
        tables.apply(record);
        Ok(())
    }
}

impl std::fmt::Debug for MetaDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaDb")
            .field("durable", &self.is_durable())
            .field("last_change_id", &self.tables.read().last_change_id())
            .finish()
    }
}

impl MetaStore for MetaDb {
    fn get_entry(&self, rel_path: &str) -> CoreResult<Option<Entry>> {
        Ok(self.tables.read().entry(rel_path).cloned())
    }

    fn put_entry(&self, entry: Entry) -> CoreResult<()> {
        let mut tables = self.tables.write();
        self.write(&mut tables, JournalRecord::PutEntry { entry })
    }

    fn live_entries_under(&self, prefix: Option<&str>) -> CoreResult<Vec<Entry>> {
        Ok(self.tables.read().live_entries_under(prefix))
    }

    fn append_change(&self, mut change: Change) -> CoreResult<u64> {
        let mut tables = self.tables.write();
        change.change_id = tables.next_change_id();
        let id = change.change_id;
        self.write(&mut tables, JournalRecord::AppendChange { change })?;
        Ok(id)
    }

    fn changes_since(&self, cursor: u64, limit: usize) -> CoreResult<Vec<Change>> {
        Ok(self.tables.read().changes_since(cursor, limit))
    }

    fn last_change_id(&self) -> CoreResult<u64> {
        Ok(self.tables.read().last_change_id())
    }

    fn commit(
        &self,
        rel_path: &str,
        mutation: EntryMutation,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Committed> {
        let mut tables = self.tables.write();
        let (record, committed) = tables.plan_commit(rel_path, mutation, device_id, now);
        self.write(&mut tables, record)?;
        Ok(committed)
    }

    fn insert_upload(&self, session: UploadSession) -> CoreResult<()> {
        let mut tables = self.tables.write();
        self.write(&mut tables, JournalRecord::PutUpload { session })
    }

    fn get_upload(&self, upload_id: &str) -> CoreResult<Option<UploadSession>> {
        Ok(self.tables.read().upload(upload_id).cloned())
    }

    fn advance_upload(
        &self,
        upload_id: &str,
        from: u64,
        to: u64,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let mut tables = self.tables.write();
        match tables.upload(upload_id) {
            Some(session) if session.received_bytes == from => {}
            _ => return Ok(false),
        }
        self.write(
            &mut tables,
            JournalRecord::AdvanceUpload {
                upload_id: upload_id.to_string(),
                received_bytes: to,
                updated_at: now,
            },
        )?;
        Ok(true)
    }

    fn remove_upload(&self, upload_id: &str) -> CoreResult<Option<UploadSession>> {
        let mut tables = self.tables.write();
        let Some(session) = tables.upload(upload_id).cloned() else {
            return Ok(None);
        };
        self.write(
            &mut tables,
            JournalRecord::RemoveUpload {
                upload_id: upload_id.to_string(),
            },
        )?;
        Ok(Some(session))
    }

    fn uploads_idle_since(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<UploadSession>> {
        Ok(self.tables.read().uploads_idle_since(cutoff))
    }

    fn insert_share(&self, share: Share) -> CoreResult<bool> {
        let mut tables = self.tables.write();
        if tables.share(&share.token).is_some() {
            return Ok(false);
        }
        self.write(&mut tables, JournalRecord::PutShare { share })?;
        Ok(true)
    }

    fn get_share(&self, token: &str) -> CoreResult<Option<Share>> {
        Ok(self.tables.read().share(token).cloned())
    }

    fn remove_share(&self, token: &str) -> CoreResult<bool> {
        let mut tables = self.tables.write();
        if tables.share(token).is_none() {
            return Ok(false);
        }
        self.write(
            &mut tables,
            JournalRecord::RemoveShare {
                token: token.to_string(),
            },
        )?;
        Ok(true)
    }
}
