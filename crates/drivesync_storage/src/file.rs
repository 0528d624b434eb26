//! File-backed append store.

use crate::append::AppendStore;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// An append store backed by a single file.
///
/// # Durability
///
/// `sync()` calls `File::sync_all()`; callers that need every record on
/// disk before acknowledging a write call it after each append.
///
/// A failed append leaves nothing behind: the file is cut back to the
/// offset the append started at. Bytes past the last acknowledged append
/// are dropped before the next write.
///
/// # Example
///
/// ```no_run
/// use drivesync_storage::{AppendStore, FileAppendStore};
/// use std::path::Path;
///
/// let store = FileAppendStore::open(Path::new("meta.journal")).unwrap();
/// store.append(b"{\"kind\":\"noop\"}\n").unwrap();
/// store.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileAppendStore {
    path: PathBuf,
    inner: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    size: u64,
}

impl FileAppendStore {
    /// Opens or creates an append store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState { file, size }),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileState {
    fn write_at_end(&mut self, data: &[u8]) -> std::io::Result<()> {
        // Leftovers of an append whose rollback also failed.
        if self.file.metadata()?.len() != self.size {
            self.file.set_len(self.size)?;
        }
        self.file.seek(SeekFrom::Start(self.size))?;
        self.file.write_all(data)
    }
}

impl AppendStore for FileAppendStore {
    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.inner.lock();
        let offset = state.size;
        if data.is_empty() {
            return Ok(offset);
        }

        if let Err(e) = state.write_at_end(data) {
            if let Err(rollback) = state.file.set_len(offset) {
                warn!(
                    path = %self.path.display(),
                    offset,
                    error = %rollback,
                    "cannot roll back failed append"
                );
            }
            return Err(e.into());
        }
        state.size += data.len() as u64;
        Ok(offset)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let mut state = self.inner.lock();
        let mut buffer = Vec::with_capacity(state.size as usize);
        state.file.seek(SeekFrom::Start(0))?;
        state.file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn sync(&self) -> StorageResult<()> {
        let mut state = self.inner.lock();
        state.file.flush()?;
        state.file.sync_all()?;
        Ok(())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let mut state = self.inner.lock();
        if new_size > state.size {
            return Err(StorageError::ReadPastEnd {
                offset: new_size,
                len: 0,
                size: state.size,
            });
        }

        state.file.set_len(new_size)?;
        state.file.sync_all()?;
        state.size = new_size;
        Ok(())
    }
}
