//! Journal record format.
//!
//! One record per line:
//!
//! ```text
//! <crc32 of json, 8 lowercase hex digits> <json>\n
//! ```
//!
//! A final line without its newline is a torn write and is discarded on
//! replay. A complete line that fails its checksum or does not parse is
//! corruption.

use crate::error::{CoreError, CoreResult};
use crate::types::{Change, Entry, Share, UploadSession};
use chrono::{DateTime, Utc};
use drivesync_storage::crc32_of_bytes;
use serde::{Deserialize, Serialize};

/// A single row mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum JournalRecord {
    PutEntry {
        entry: Entry,
    },
    AppendChange {
        change: Change,
    },
    Commit {
        entry: Entry,
        change: Change,
    },
    PutUpload {
        session: UploadSession,
    },
    AdvanceUpload {
        upload_id: String,
        received_bytes: u64,
        updated_at: DateTime<Utc>,
    },
    RemoveUpload {
        upload_id: String,
    },
    PutShare {
        share: Share,
    },
    RemoveShare {
        token: String,
    },
}

impl JournalRecord {
    pub(crate) fn encode(&self) -> CoreResult<Vec<u8>> {
        let json = serde_json::to_vec(self)
            .map_err(|e| CoreError::journal(format!("cannot encode record: {e}")))?;
        let mut line = format!("{:08x} ", crc32_of_bytes(&json)).into_bytes();
        line.extend_from_slice(&json);
        line.push(b'\n');
        Ok(line)
    }

    /// Decodes one line, without its trailing newline.
    pub(crate) fn decode(line: &[u8]) -> CoreResult<Self> {
        if line.len() < 10 || line[8] != b' ' {
            return Err(CoreError::journal("malformed record header"));
        }
        let stored = std::str::from_utf8(&line[..8])
            .ok()
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or_else(|| CoreError::journal("malformed record checksum"))?;
        let json = &line[9..];
        let actual = crc32_of_bytes(json);
        if stored != actual {
            return Err(CoreError::journal(format!(
                "record checksum mismatch: stored {stored:08x}, computed {actual:08x}"
            )));
        }
        serde_json::from_slice(json)
            .map_err(|e| CoreError::journal(format!("cannot decode record: {e}")))
    }
}
