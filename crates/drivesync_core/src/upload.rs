//! The Upload Session Manager: init, chunk, finalize.
//!
//! ```text
//! init ──► Pending ──chunk──► Receiving ──chunk──► … ──finalize──► (row deleted)
//! ```
//!
//! A session accepts bytes strictly at its watermark. A chunk that starts
//! below the watermark is a retry and is acknowledged without writing; one
//! that starts above it is refused with the offset the server expects.
//! Callers are expected to send one chunk at a time per session; chunks for
//! the same session are also serialized in-process.

use crate::config::Config;
use crate::conflict::{decide_path, sanitize_label, DEFAULT_DEVICE_LABEL};
use crate::error::{CoreError, CoreResult};
use crate::locks::KeyedLocks;
use crate::meta::{EntryMutation, MetaStore};
use crate::types::{Entry, UploadSession};
use chrono::Utc;
use drivesync_storage::{NormalizedPath, StorageRoot};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Length of generated upload ids.
pub const UPLOAD_ID_LEN: usize = 32;

/// Parameters of an upload init call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitUpload {
    /// Requested destination, not yet normalized.
    pub rel_path: String,
    /// Declared size in bytes.
    pub size: i64,
    /// Client modification time.
    pub mtime: i64,
    /// Expected CRC32 of the content.
    pub content_hash: Option<u32>,
    /// Revision the client last saw for the path (0 for none).
    pub base_rev: u64,
    /// Opaque device identifier.
    pub device_id: Option<String>,
    /// Human-readable device name used in conflict paths.
    pub device_label: Option<String>,
}

/// Result of a successful init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    /// Id for subsequent chunk and finalize calls.
    pub upload_id: String,
    /// Where the upload will land.
    pub decided_path: NormalizedPath,
    /// True if the destination was renamed because of a conflict.
    pub conflicted: bool,
    /// Advisory chunk size.
    pub suggested_chunk_size_mb: u32,
}

/// Result of an accepted chunk call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Bytes were appended.
    Accepted {
        /// New watermark.
        received_bytes: u64,
    },
    /// The chunk was already received; nothing was written.
    Duplicate {
        /// Current watermark.
        received_bytes: u64,
    },
}

impl ChunkOutcome {
    /// Returns the watermark after the call.
    #[must_use]
    pub fn received_bytes(self) -> u64 {
        match self {
            ChunkOutcome::Accepted { received_bytes }
            | ChunkOutcome::Duplicate { received_bytes } => received_bytes,
        }
    }
}

/// Result of a successful finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// The entry as committed.
    pub entry: Entry,
    /// Id of the upsert change.
    pub change_id: u64,
}

/// Drives upload sessions from init to finalize.
#[derive(Clone)]
pub struct UploadManager {
    meta: Arc<dyn MetaStore>,
    root: Arc<StorageRoot>,
    config: Arc<Config>,
    path_locks: Arc<KeyedLocks>,
    upload_locks: Arc<KeyedLocks>,
}

impl UploadManager {
    pub(crate) fn new(
        meta: Arc<dyn MetaStore>,
        root: Arc<StorageRoot>,
        config: Arc<Config>,
        path_locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            meta,
            root,
            config,
            path_locks,
            upload_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Starts an upload session.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPath`] or [`CoreError::InvalidMetadata`]
    /// for bad input, or a storage error if the spool cannot be created.
    pub fn init(&self, req: InitUpload) -> CoreResult<InitOutcome> {
        let requested = NormalizedPath::parse(&req.rel_path)?;
        let size = u64::try_from(req.size)
            .map_err(|_| CoreError::invalid_metadata("size must be non-negative"))?;
        let mtime = u64::try_from(req.mtime)
            .map_err(|_| CoreError::invalid_metadata("mtime must be non-negative"))?;
        let device_id = truncate_device_field(req.device_id, self.config.max_device_id_len);
        let label = truncate_device_field(req.device_label, self.config.max_device_label_len)
            .map_or_else(|| DEFAULT_DEVICE_LABEL.to_string(), |l| sanitize_label(&l));

        let now = Utc::now();
        let live_rev = self
            .meta
            .get_entry(requested.as_str())?
            .filter(Entry::is_live)
            .map(|e| e.rev);
        let decision = decide_path(&requested, live_rev, req.base_rev, &label, now)?;
        if decision.conflicted {
            debug!(
                requested = %requested,
                decided = %decision.path,
                live_rev,
                base_rev = req.base_rev,
                "stale base revision, diverting upload"
            );
        }

        let upload_id = self.allocate_upload_id()?;
        let spool_path = self.root.create_spool(&upload_id)?;
        let session = UploadSession {
            upload_id: upload_id.clone(),
            rel_path: requested.as_str().to_string(),
            decided_path: decision.path.as_str().to_string(),
            base_rev: req.base_rev,
            size,
            mtime,
            content_hash: req.content_hash,
            received_bytes: 0,
            spool_path: spool_path.clone(),
            device_id,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.meta.insert_upload(session) {
            self.root.discard(&spool_path);
            return Err(e);
        }

        info!(
            upload_id = %upload_id,
            decided_path = %decision.path,
            size,
            conflicted = decision.conflicted,
            "upload started"
        );
        Ok(InitOutcome {
            upload_id,
            decided_path: decision.path,
            conflicted: decision.conflicted,
            suggested_chunk_size_mb: self.config.suggested_chunk_size_mb,
        })
    }

    /// Accepts the bytes of one chunk starting at `offset`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownUpload`] if no session exists
    /// - [`CoreError::InvalidMetadata`] for a negative offset
    /// - [`CoreError::OffsetAhead`] if `offset` skips past the watermark
    /// - [`CoreError::EmptyChunk`] for an empty body
    /// - [`CoreError::ChunkOverflow`] if the chunk passes the declared size
    /// - [`CoreError::ConcurrentChunk`] if another writer moved the watermark
    pub fn chunk(&self, upload_id: &str, offset: i64, data: &[u8]) -> CoreResult<ChunkOutcome> {
        let offset = u64::try_from(offset)
            .map_err(|_| CoreError::invalid_metadata("offset must be non-negative"))?;
        let _guard = self.upload_locks.lock(upload_id);
        let session = self.session(upload_id)?;
        let received = session.received_bytes;

        if offset > received {
            return Err(CoreError::OffsetAhead {
                expected: received,
                got: offset,
            });
        }
        if data.is_empty() {
            return Err(CoreError::EmptyChunk);
        }
        if offset < received {
            debug!(upload_id, offset, received, "duplicate chunk ignored");
            return Ok(ChunkOutcome::Duplicate {
                received_bytes: received,
            });
        }

        let end = received + data.len() as u64;
        if end > session.size {
            return Err(CoreError::ChunkOverflow {
                size: session.size,
                end,
            });
        }

        let spool_len = self.root.append_spool(&session.spool_path, received, data)?;
        if spool_len != end
            || !self
                .meta
                .advance_upload(upload_id, received, end, Utc::now())?
        {
            warn!(upload_id, received, end, spool_len, "chunk lost a race");
            return Err(CoreError::ConcurrentChunk {
                upload_id: upload_id.to_string(),
            });
        }

        debug!(upload_id, received_bytes = end, "chunk accepted");
        Ok(ChunkOutcome::Accepted {
            received_bytes: end,
        })
    }

    /// Verifies a complete upload and promotes it into the file tree.
    ///
    /// Integrity failures leave the session and its spool in place.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownUpload`] if no session exists
    /// - [`CoreError::IncompleteUpload`] if bytes are missing
    /// - [`CoreError::ChecksumMismatch`] if the declared CRC32 differs
    /// - [`CoreError::BrokenSession`] if the spool is missing or the wrong size
    /// - a storage error if promotion fails
    /// - a metadata error if the commit fails; the session and a copy of
    ///   its spool are kept so the call can be retried
    pub fn finalize(&self, upload_id: &str) -> CoreResult<FinalizeOutcome> {
        let _guard = self.upload_locks.lock(upload_id);
        let session = self.session(upload_id)?;

        if !session.is_complete() {
            return Err(CoreError::IncompleteUpload {
                received: session.received_bytes,
                expected: session.size,
            });
        }

        match self.root.blob_len(&session.spool_path)? {
            None => {
                return Err(CoreError::broken_session(upload_id, "spool file is missing"))
            }
            Some(len) if len != session.size => {
                return Err(CoreError::broken_session(
                    upload_id,
                    format!("spool holds {len} bytes, expected {}", session.size),
                ))
            }
            Some(_) => {}
        }

        let actual = self.root.checksum(&session.spool_path)?;
        if let Some(expected) = session.content_hash {
            if expected != actual {
                return Err(CoreError::ChecksumMismatch { expected, actual });
            }
        }

        let decided = NormalizedPath::parse(&session.decided_path)
            .map_err(|e| CoreError::broken_session(upload_id, e.to_string()))?;

        let committed = {
            let _path_guard = self.path_locks.lock(decided.as_str());
            let location = self.root.promote(&session.spool_path, &decided)?;
            let result = self.meta.commit(
                decided.as_str(),
                EntryMutation::Upsert {
                    size: session.size,
                    mtime: session.mtime,
                    content_hash: actual,
                    storage_location: location.clone(),
                },
                session.device_id.as_deref(),
                Utc::now(),
            );
            match result {
                Ok(committed) => committed,
                Err(e) => {
                    // The file tree already holds the new bytes; re-spool them
                    // so a retried finalize can commit.
                    match self.root.restore_spool(&location, &session.spool_path) {
                        Ok(()) => warn!(
                            upload_id,
                            rel_path = %decided,
                            error = %e,
                            "commit failed after promotion, spool restored for retry"
                        ),
                        Err(restore) => error!(
                            upload_id,
                            rel_path = %decided,
                            error = %e,
                            restore_error = %restore,
                            "commit failed after promotion and spool could not be restored; \
                             file content is ahead of its entry"
                        ),
                    }
                    return Err(e);
                }
            }
        };

        if let Err(e) = self.meta.remove_upload(upload_id) {
            warn!(upload_id, error = %e, "could not remove finalized session");
        }

        info!(
            upload_id,
            rel_path = %decided,
            rev = committed.entry.rev,
            change_id = committed.change.change_id,
            "upload finalized"
        );
        Ok(FinalizeOutcome {
            change_id: committed.change.change_id,
            entry: committed.entry,
        })
    }

    /// Returns a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownUpload`] if it does not exist.
    pub fn session(&self, upload_id: &str) -> CoreResult<UploadSession> {
        self.meta
            .get_upload(upload_id)?
            .ok_or_else(|| CoreError::UnknownUpload {
                upload_id: upload_id.to_string(),
            })
    }

    pub(crate) fn lock_upload(&self, upload_id: &str) -> parking_lot::MutexGuard<'_, ()> {
        self.upload_locks.lock(upload_id)
    }

    fn allocate_upload_id(&self) -> CoreResult<String> {
        loop {
            let id: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(UPLOAD_ID_LEN)
                .map(char::from)
                .collect();
            if self.meta.get_upload(&id)?.is_none() {
                return Ok(id);
            }
        }
    }
}

/// Trims and truncates an optional device field; blank becomes `None`.
pub(crate) fn truncate_device_field(value: Option<String>, max_chars: usize) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}
