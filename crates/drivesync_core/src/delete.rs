//! Logical delete with tombstones.

use crate::drive::Drive;
use crate::error::CoreResult;
use crate::meta::EntryMutation;
use crate::upload::truncate_device_field;
use chrono::Utc;
use drivesync_storage::{Cleanup, NormalizedPath};
use tracing::info;

/// Result of a delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Normalized path that was deleted.
    pub rel_path: NormalizedPath,
    /// Revision of the tombstone.
    pub rev: u64,
    /// Id of the delete change.
    pub change_id: u64,
    /// True if there was no live entry to delete.
    pub already_deleted: bool,
    /// What happened to the blob, if there was one.
    pub blob_cleanup: Option<Cleanup>,
}

impl Drive {
    /// Deletes a path.
    ///
    /// Always succeeds for a valid path: the revision is bumped and a delete
    /// change is appended even if nothing was live. Removing the blob is
    /// best-effort and never fails the delete.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPath`](crate::CoreError::InvalidPath) for
    /// a bad path, or an error if the metadata store fails.
    pub fn delete(&self, rel_path: &str, device_id: Option<String>) -> CoreResult<DeleteOutcome> {
        let path = NormalizedPath::parse(rel_path)?;
        let device_id = truncate_device_field(device_id, self.config().max_device_id_len);

        let (committed, blob_cleanup) = {
            let _guard = self.path_locks.lock(path.as_str());
            let committed =
                self.meta
                    .commit(path.as_str(), EntryMutation::Delete, device_id.as_deref(), Utc::now())?;
            let blob_cleanup = committed
                .previous
                .as_ref()
                .filter(|e| e.is_live())
                .and_then(|e| e.storage_location.as_deref())
                .filter(|loc| self.root.owns(loc))
                .map(|loc| self.root.discard(loc));
            (committed, blob_cleanup)
        };

        let already_deleted = committed.was_absent();
        info!(
            rel_path = %path,
            rev = committed.entry.rev,
            change_id = committed.change.change_id,
            already_deleted,
            blob = ?blob_cleanup,
            "path deleted"
        );
        Ok(DeleteOutcome {
            rel_path: path,
            rev: committed.entry.rev,
            change_id: committed.change.change_id,
            already_deleted,
            blob_cleanup,
        })
    }
}
