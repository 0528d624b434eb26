//! The `Drive` facade: one storage root plus its metadata.

use crate::change_log::{ChangeLog, ChangePage};
use crate::config::Config;
use crate::entry_store::EntryStore;
use crate::error::{CoreError, CoreResult};
use crate::locks::KeyedLocks;
use crate::meta::{MetaDb, MetaStore};
use crate::types::{ChildSummary, Entry};
use crate::upload::{ChunkOutcome, FinalizeOutcome, InitOutcome, InitUpload, UploadManager};
use drivesync_storage::{NormalizedPath, StorageRoot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// File name of the metadata journal inside the storage root.
pub const JOURNAL_FILE: &str = "meta.journal";

/// A live file ready to be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// The entry.
    pub entry: Entry,
    /// Absolute location of the blob.
    pub location: PathBuf,
    /// Size of the blob on disk.
    pub len: u64,
}

/// A sync drive.
///
/// # Example
///
/// ```rust,ignore
/// use drivesync_core::{Config, Drive, InitUpload};
/// use std::path::Path;
///
/// let drive = Drive::open(Path::new("/srv/drive"), Config::default())?;
/// let init = drive.init_upload(InitUpload {
///     rel_path: "docs/report.pdf".into(),
///     size: 5,
///     ..Default::default()
/// })?;
/// drive.upload_chunk(&init.upload_id, 0, b"hello")?;
/// let done = drive.finalize_upload(&init.upload_id)?;
/// assert_eq!(done.entry.rev, 1);
/// ```
pub struct Drive {
    pub(crate) config: Arc<Config>,
    pub(crate) root: Arc<StorageRoot>,
    pub(crate) meta: Arc<dyn MetaStore>,
    pub(crate) path_locks: Arc<KeyedLocks>,
    pub(crate) entries: EntryStore,
    pub(crate) changes: ChangeLog,
    pub(crate) uploads: UploadManager,
}

impl Drive {
    /// Opens a drive with a journaled metadata store inside the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is locked or cannot be created, or the
    /// journal is corrupt.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let root = StorageRoot::open(path)?;
        let meta = MetaDb::open(&root.base().join(JOURNAL_FILE), config.sync_on_commit)?;
        info!(root = %root.base().display(), "drive opened");
        Ok(Self::with_meta(root, Arc::new(meta), config))
    }

    /// Opens a drive whose metadata lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is locked or cannot be created.
    pub fn open_ephemeral(path: &Path, config: Config) -> CoreResult<Self> {
        let root = StorageRoot::open(path)?;
        Ok(Self::with_meta(root, Arc::new(MetaDb::open_in_memory()), config))
    }

    /// Assembles a drive from an opened root and a metadata store.
    pub fn with_meta(root: StorageRoot, meta: Arc<dyn MetaStore>, config: Config) -> Self {
        let config = Arc::new(config);
        let root = Arc::new(root);
        let path_locks = Arc::new(KeyedLocks::new());
        Self {
            entries: EntryStore::new(Arc::clone(&meta)),
            changes: ChangeLog::new(Arc::clone(&meta)),
            uploads: UploadManager::new(
                Arc::clone(&meta),
                Arc::clone(&root),
                Arc::clone(&config),
                Arc::clone(&path_locks),
            ),
            config,
            root,
            meta,
            path_locks,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the storage root.
    #[must_use]
    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Returns a handle to the metadata store.
    #[must_use]
    pub fn meta(&self) -> Arc<dyn MetaStore> {
        Arc::clone(&self.meta)
    }

    /// Returns the entry store.
    #[must_use]
    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }

    /// Returns the change log.
    #[must_use]
    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    /// Returns the upload session manager.
    #[must_use]
    pub fn uploads(&self) -> &UploadManager {
        &self.uploads
    }

    /// Starts an upload. See [`UploadManager::init`].
    ///
    /// # Errors
    ///
    /// See [`UploadManager::init`].
    pub fn init_upload(&self, req: InitUpload) -> CoreResult<InitOutcome> {
        self.uploads.init(req)
    }

    /// Accepts a chunk. See [`UploadManager::chunk`].
    ///
    /// # Errors
    ///
    /// See [`UploadManager::chunk`].
    pub fn upload_chunk(&self, upload_id: &str, offset: i64, data: &[u8]) -> CoreResult<ChunkOutcome> {
        self.uploads.chunk(upload_id, offset, data)
    }

    /// Finalizes an upload. See [`UploadManager::finalize`].
    ///
    /// # Errors
    ///
    /// See [`UploadManager::finalize`].
    pub fn finalize_upload(&self, upload_id: &str) -> CoreResult<FinalizeOutcome> {
        self.uploads.finalize(upload_id)
    }

    /// Lists a directory (`None` for the root).
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn list(&self, dir: Option<&NormalizedPath>) -> CoreResult<Vec<ChildSummary>> {
        self.entries.list_children(dir)
    }

    /// Returns the changes after `since`, with the page size clamped.
    ///
    /// A negative cursor reads from the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn changes_since(&self, since: i64, limit: Option<i64>) -> CoreResult<ChangePage> {
        let cursor = u64::try_from(since).unwrap_or(0);
        self.changes
            .since(cursor, self.config.clamp_changes_limit(limit))
    }

    /// Resolves a live file for reading.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the path is absent, deleted, or
    /// its blob is missing from disk.
    pub fn resolve_file(&self, path: &NormalizedPath) -> CoreResult<ResolvedFile> {
        let not_found = || CoreError::not_found(path.as_str());
        let entry = self.entries.get_live(path)?.ok_or_else(not_found)?;
        let location = entry.storage_location.clone().ok_or_else(not_found)?;
        if !self.root.owns(&location) {
            warn!(rel_path = %path, location = %location.display(), "stored location outside root");
            return Err(not_found());
        }
        let len = self.root.blob_len(&location)?.ok_or_else(not_found)?;
        Ok(ResolvedFile {
            entry,
            location,
            len,
        })
    }
}

impl std::fmt::Debug for Drive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drive")
            .field("root", &self.root.base())
            .field("config", &self.config)
            .finish()
    }
}
