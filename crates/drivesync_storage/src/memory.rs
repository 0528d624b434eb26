//! In-memory append store for testing.

use crate::append::AppendStore;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// An in-memory append store.
///
/// Suitable for unit tests and ephemeral servers that do not need the
/// metadata journal to survive a restart.
///
/// # Example
///
/// ```rust
/// use drivesync_storage::{AppendStore, MemoryAppendStore};
///
/// let store = MemoryAppendStore::new();
/// assert_eq!(store.append(b"abc").unwrap(), 0);
/// assert_eq!(store.size().unwrap(), 3);
/// ```
#[derive(Debug, Default)]
pub struct MemoryAppendStore {
    data: RwLock<Vec<u8>>,
}

impl MemoryAppendStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing contents.
    ///
    /// Useful for testing journal replay.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

impl AppendStore for MemoryAppendStore {
    fn append(&self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.data.read().clone())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::ReadPastEnd {
                offset: new_size,
                len: 0,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}
