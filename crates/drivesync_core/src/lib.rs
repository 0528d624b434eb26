//! # DriveSync Core
//!
//! The sync engine behind a DriveSync server.
//!
//! This crate provides:
//! - Entry Store: one revisioned row per normalized path, with tombstones
//! - Change Log: a global, gap-free ledger read with a `since` cursor
//! - Upload Session Manager: resumable init → chunk → finalize uploads with
//!   conflict-path diversion and atomic promotion
//! - Delete, and a sweeper for abandoned uploads
//! - [`MetaStore`], the persistence seam, and [`MetaDb`], its journaled
//!   implementation
//!
//! [`Drive`] ties these to one [`StorageRoot`](drivesync_storage::StorageRoot).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod change_log;
mod config;
mod conflict;
mod delete;
mod drive;
mod entry_store;
mod error;
mod locks;
pub mod meta;
mod sweeper;
mod types;
mod upload;

pub use change_log::{ChangeLog, ChangePage};
pub use config::Config;
pub use conflict::{conflict_path, decide_path, sanitize_label, PathDecision, DEFAULT_DEVICE_LABEL};
pub use delete::DeleteOutcome;
pub use drive::{Drive, ResolvedFile, JOURNAL_FILE};
pub use entry_store::{derive_children, EntryStore};
pub use error::{CoreError, CoreResult};
pub use meta::{Committed, EntryMutation, MetaDb, MetaStore};
pub use sweeper::SweepReport;
pub use types::{Change, ChangeAction, ChildSummary, Entry, Share, UploadSession, UploadState};
pub use upload::{
    ChunkOutcome, FinalizeOutcome, InitOutcome, InitUpload, UploadManager, UPLOAD_ID_LEN,
};

pub use drivesync_storage::NormalizedPath;
