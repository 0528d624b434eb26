//! The Change Log: append-only ledger read with a cursor.

use crate::error::CoreResult;
use crate::meta::MetaStore;
use crate::types::Change;
use std::sync::Arc;

/// One page of changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePage {
    /// Changes with ids above the cursor, ascending.
    pub changes: Vec<Change>,
    /// Cursor for the next call: the last id in the page, or the input cursor.
    pub next_cursor: u64,
}

/// Query surface over change rows.
#[derive(Clone)]
pub struct ChangeLog {
    meta: Arc<dyn MetaStore>,
}

impl ChangeLog {
    /// Creates a change log over a metadata backend.
    pub fn new(meta: Arc<dyn MetaStore>) -> Self {
        Self { meta }
    }

    /// Appends a change and returns its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn append(&self, change: Change) -> CoreResult<u64> {
        self.meta.append_change(change)
    }

    /// Returns up to `limit` changes after `cursor`.
    ///
    /// `limit` is expected to be clamped already
    /// (see [`Config::clamp_changes_limit`](crate::Config::clamp_changes_limit)).
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn since(&self, cursor: u64, limit: usize) -> CoreResult<ChangePage> {
        let changes = self.meta.changes_since(cursor, limit.max(1))?;
        let next_cursor = changes.last().map_or(cursor, |c| c.change_id);
        Ok(ChangePage {
            changes,
            next_cursor,
        })
    }

    /// Returns the id of the most recent change, or 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn head(&self) -> CoreResult<u64> {
        self.meta.last_change_id()
    }
}
