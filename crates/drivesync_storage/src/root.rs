//! Sandboxed storage root.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/
//! ├─ LOCK            # Advisory lock, one server process per root
//! ├─ files/          # Canonical file tree, keyed by normalized path
//! └─ _tmp/           # Upload spool files (<upload_id>.part)
//! ```
//!
//! Every write into `files/` goes through [`join_private`], so nothing can
//! land outside the root even if a stored path was crafted to survive
//! normalization.

use crate::checksum::crc32_of_file;
use crate::error::{StorageError, StorageResult};
use crate::path::{join_private, NormalizedPath};
use fs2::FileExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_FILE: &str = "LOCK";
const FILES_DIR: &str = "files";
const TMP_DIR: &str = "_tmp";
const SPOOL_EXT: &str = "part";

/// Outcome of a best-effort filesystem cleanup.
///
/// Cleanups never fail the operation that requested them; the outcome is
/// logged and returned so callers and tests can observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// The file existed and was removed.
    Removed,
    /// There was nothing to remove.
    Missing,
    /// Removal failed; the file may still be on disk.
    Failed,
}

/// The storage root a server instance owns.
#[derive(Debug)]
pub struct StorageRoot {
    base: PathBuf,
    files: PathBuf,
    tmp: PathBuf,
    _lock_file: File,
}

impl StorageRoot {
    /// Opens a storage root, creating its directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::RootLocked`] if another process holds the
    /// root, or an I/O error if the directories cannot be created.
    pub fn open(base: &Path) -> StorageResult<Self> {
        fs::create_dir_all(base)?;
        let base = base.canonicalize()?;
        let files = base.join(FILES_DIR);
        let tmp = base.join(TMP_DIR);
        fs::create_dir_all(&files)?;
        fs::create_dir_all(&tmp)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(base.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::RootLocked);
        }

        Ok(Self {
            base,
            files,
            tmp,
            _lock_file: lock_file,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns the canonical file tree directory.
    #[must_use]
    pub fn files_dir(&self) -> &Path {
        &self.files
    }

    /// Returns the spool directory.
    #[must_use]
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp
    }

    /// Resolves a normalized path to its absolute location in the file tree.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutsideRoot`] if the location escapes the tree.
    pub fn resolve(&self, rel: &NormalizedPath) -> StorageResult<PathBuf> {
        join_private(&self.files, rel)
    }

    /// Returns the spool file location for an upload.
    #[must_use]
    pub fn spool_path(&self, upload_id: &str) -> PathBuf {
        self.tmp.join(format!("{upload_id}.{SPOOL_EXT}"))
    }

    /// Creates an empty spool file for an upload and returns its location.
    ///
    /// An existing spool for the same id is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_spool(&self, upload_id: &str) -> StorageResult<PathBuf> {
        let path = self.spool_path(upload_id);
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(path)
    }

    /// Appends a chunk at `at`, the number of bytes already acknowledged,
    /// and returns the new spool length.
    ///
    /// Bytes past `at` left behind by an earlier failed chunk are dropped
    /// first, so a retried chunk lands where the watermark says it should.
    ///
    /// # Errors
    ///
    /// Returns an error if the spool is missing, shorter than `at`, or the
    /// write fails.
    pub fn append_spool(&self, spool: &Path, at: u64, data: &[u8]) -> StorageResult<u64> {
        let mut file = OpenOptions::new().append(true).open(spool)?;
        let len = file.metadata()?.len();
        if len < at {
            return Err(StorageError::ReadPastEnd {
                offset: at,
                len: data.len(),
                size: len,
            });
        }
        if len > at {
            debug!(spool = %spool.display(), len, at, "dropping unacknowledged spool bytes");
            file.set_len(at)?;
        }
        file.write_all(data)?;
        file.flush()?;
        Ok(file.metadata()?.len())
    }

    /// Returns the CRC32 of a spooled or stored file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn checksum(&self, path: &Path) -> StorageResult<u32> {
        crc32_of_file(path)
    }

    /// Moves a completed spool file to its final place in the file tree.
    ///
    /// The spool is first moved (or, across devices, copied) to a temporary
    /// sibling of the destination, then renamed over the destination. A
    /// crash at any point leaves at worst a stray `*.tmp.*` file; readers of
    /// the destination see either the old or the new content.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutsideRoot`] if the destination escapes the
    /// tree, or [`StorageError::Promote`] if the move fails.
    pub fn promote(&self, spool: &Path, dest_rel: &NormalizedPath) -> StorageResult<PathBuf> {
        let dest = self.resolve(dest_rel)?;
        let promote_err = |source: io::Error| StorageError::Promote {
            dest: dest.clone(),
            source,
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(promote_err)?;
        }

        let mut staged_name = dest.as_os_str().to_owned();
        staged_name.push(format!(".tmp.{}", random_suffix(8)));
        let staged = PathBuf::from(staged_name);

        if let Err(rename_err) = fs::rename(spool, &staged) {
            debug!(error = %rename_err, "rename into place failed, falling back to copy");
            fs::copy(spool, &staged).map_err(promote_err)?;
            self.discard(spool);
        }

        if let Err(first) = fs::rename(&staged, &dest) {
            // Platforms without replace-on-rename need the old file gone first.
            if !dest.exists() {
                return Err(promote_err(first));
            }
            fs::remove_file(&dest).map_err(promote_err)?;
            fs::rename(&staged, &dest).map_err(promote_err)?;
        }

        Ok(dest)
    }

    /// Copies promoted content back into a spool so the promotion can be
    /// repeated.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutsideRoot`] if `promoted` is not in the
    /// file tree or `spool` is not in the spool directory, or an I/O error
    /// if the copy fails.
    pub fn restore_spool(&self, promoted: &Path, spool: &Path) -> StorageResult<()> {
        if !self.owns(promoted) {
            return Err(StorageError::OutsideRoot {
                path: promoted.to_path_buf(),
            });
        }
        if spool.parent() != Some(self.tmp.as_path()) {
            return Err(StorageError::OutsideRoot {
                path: spool.to_path_buf(),
            });
        }
        fs::copy(promoted, spool)?;
        Ok(())
    }

    /// Removes a file without propagating failure.
    pub fn discard(&self, path: &Path) -> Cleanup {
        match fs::remove_file(path) {
            Ok(()) => Cleanup::Removed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Cleanup::Missing,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "best-effort removal failed");
                Cleanup::Failed
            }
        }
    }

    /// Returns the size of a stored file, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error for I/O failures other than a missing file.
    pub fn blob_len(&self, path: &Path) -> StorageResult<Option<u64>> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns true if `path` lies inside the canonical file tree.
    #[must_use]
    pub fn owns(&self, path: &Path) -> bool {
        path.starts_with(&self.files) && path != self.files
    }
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
