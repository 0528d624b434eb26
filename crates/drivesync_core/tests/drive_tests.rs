//! End-to-end tests of the sync engine against a real storage root.

use chrono::{DateTime, Utc};
use drivesync_core::{
    Change, ChangeAction, ChunkOutcome, Committed, Config, CoreError, CoreResult, Drive, Entry,
    EntryMutation, InitUpload, MetaDb, MetaStore, NormalizedPath, Share, UploadSession,
};
use drivesync_storage::{crc32_of_bytes, Cleanup, StorageRoot};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

fn drive() -> (TempDir, Drive) {
    let dir = tempdir().unwrap();
    let drive = Drive::open(dir.path(), Config::default()).unwrap();
    (dir, drive)
}

fn init(drive: &Drive, path: &str, data: &[u8], base_rev: u64) -> String {
    drive
        .init_upload(InitUpload {
            rel_path: path.into(),
            size: data.len() as i64,
            mtime: 1_700_000_000,
            content_hash: Some(crc32_of_bytes(data)),
            base_rev,
            device_id: Some("dev-a".into()),
            device_label: Some("Laptop".into()),
        })
        .unwrap()
        .upload_id
}

fn upload(drive: &Drive, path: &str, data: &[u8], base_rev: u64) -> drivesync_core::FinalizeOutcome {
    let id = init(drive, path, data, base_rev);
    if !data.is_empty() {
        drive.upload_chunk(&id, 0, data).unwrap();
    }
    drive.finalize_upload(&id).unwrap()
}

fn p(s: &str) -> NormalizedPath {
    NormalizedPath::parse(s).unwrap()
}

#[test]
fn two_chunk_upload_then_stale_writer_conflicts() {
    let (_dir, drive) = drive();
    let data: Vec<u8> = (0..100u8).collect();

    let outcome = drive
        .init_upload(InitUpload {
            rel_path: "docs/report.pdf".into(),
            size: 100,
            mtime: 5,
            content_hash: Some(crc32_of_bytes(&data)),
            base_rev: 0,
            device_id: Some("a".into()),
            device_label: Some("A".into()),
        })
        .unwrap();
    assert_eq!(outcome.decided_path.as_str(), "docs/report.pdf");
    assert_eq!(outcome.suggested_chunk_size_mb, 32);
    assert_eq!(outcome.upload_id.len(), 32);
    assert!(outcome.upload_id.chars().all(|c| c.is_ascii_alphanumeric()));

    let id = outcome.upload_id;
    assert_eq!(
        drive.upload_chunk(&id, 0, &data[..60]).unwrap(),
        ChunkOutcome::Accepted { received_bytes: 60 }
    );
    assert_eq!(
        drive.upload_chunk(&id, 60, &data[60..]).unwrap(),
        ChunkOutcome::Accepted { received_bytes: 100 }
    );
    let done = drive.finalize_upload(&id).unwrap();
    assert_eq!(done.entry.rev, 1);
    assert_eq!(done.change_id, 1);
    assert_eq!(done.entry.content_hash, Some(crc32_of_bytes(&data)));

    let page = drive.changes_since(0, None).unwrap();
    assert_eq!(page.changes.len(), 1);
    assert_eq!(page.changes[0].action, ChangeAction::Upsert);
    assert_eq!(page.next_cursor, 1);

    let stale = drive
        .init_upload(InitUpload {
            rel_path: "docs/report.pdf".into(),
            size: 3,
            mtime: 6,
            base_rev: 0,
            device_label: Some("B".into()),
            ..Default::default()
        })
        .unwrap();
    assert!(stale.conflicted);
    assert_ne!(stale.decided_path.as_str(), "docs/report.pdf");
    assert!(stale.decided_path.as_str().starts_with("docs/report (conflict from B "));
    assert!(stale.decided_path.as_str().ends_with(").pdf"));

    let resolved = drive.resolve_file(&p("docs/report.pdf")).unwrap();
    assert_eq!(fs::read(&resolved.location).unwrap(), data);
    assert_eq!(resolved.len, 100);
}

#[test]
fn base_rev_matching_current_overwrites_in_place() {
    let (_dir, drive) = drive();
    upload(&drive, "a.txt", b"one", 0);
    upload(&drive, "a.txt", b"two", 1);
    let third = upload(&drive, "a.txt", b"three", 2);
    assert_eq!(third.entry.rev, 3);

    let conflict = drive
        .init_upload(InitUpload {
            rel_path: "a.txt".into(),
            size: 1,
            base_rev: 2,
            ..Default::default()
        })
        .unwrap();
    assert!(conflict.conflicted);
    assert!(conflict.decided_path.as_str().contains("conflict from device"));

    let current = drive
        .init_upload(InitUpload {
            rel_path: "a.txt".into(),
            size: 1,
            base_rev: 3,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(current.decided_path.as_str(), "a.txt");

    let resolved = drive.resolve_file(&p("a.txt")).unwrap();
    assert_eq!(fs::read(resolved.location).unwrap(), b"three");
}

#[test]
fn chunk_protocol_errors() {
    let (_dir, drive) = drive();
    let id = init(&drive, "f.bin", b"0123456789", 0);

    assert!(matches!(
        drive.upload_chunk("nope", 0, b"x"),
        Err(CoreError::UnknownUpload { .. })
    ));
    assert!(matches!(
        drive.upload_chunk(&id, -1, b"x"),
        Err(CoreError::InvalidMetadata { .. })
    ));
    assert!(matches!(
        drive.upload_chunk(&id, 4, b"4567"),
        Err(CoreError::OffsetAhead { expected: 0, got: 4 })
    ));
    assert!(matches!(
        drive.upload_chunk(&id, 0, b""),
        Err(CoreError::EmptyChunk)
    ));
    assert!(matches!(
        drive.upload_chunk(&id, 0, b"0123456789AB"),
        Err(CoreError::ChunkOverflow { size: 10, end: 12 })
    ));

    drive.upload_chunk(&id, 0, b"0123").unwrap();
    assert!(matches!(
        drive.finalize_upload(&id),
        Err(CoreError::IncompleteUpload {
            received: 4,
            expected: 10
        })
    ));
}

#[test]
fn duplicate_chunk_is_idempotent() {
    let (_dir, drive) = drive();
    let data = b"abcdefgh";
    let id = init(&drive, "dup.txt", data, 0);

    drive.upload_chunk(&id, 0, &data[..4]).unwrap();
    assert_eq!(
        drive.upload_chunk(&id, 0, b"ZZZZ").unwrap(),
        ChunkOutcome::Duplicate { received_bytes: 4 }
    );
    assert_eq!(drive.uploads().session(&id).unwrap().received_bytes, 4);

    drive.upload_chunk(&id, 4, &data[4..]).unwrap();
    let done = drive.finalize_upload(&id).unwrap();
    let resolved = drive.resolve_file(&p("dup.txt")).unwrap();
    assert_eq!(fs::read(resolved.location).unwrap(), data);
    assert_eq!(done.entry.content_hash, Some(crc32_of_bytes(data)));
}

#[test]
fn checksum_mismatch_keeps_session_and_spool() {
    let (_dir, drive) = drive();
    let id = drive
        .init_upload(InitUpload {
            rel_path: "bad.bin".into(),
            size: 3,
            content_hash: Some(1),
            ..Default::default()
        })
        .unwrap()
        .upload_id;
    drive.upload_chunk(&id, 0, b"abc").unwrap();

    let err = drive.finalize_upload(&id).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ChecksumMismatch { expected: 1, actual } if actual == crc32_of_bytes(b"abc")
    ));
    let session = drive.uploads().session(&id).unwrap();
    assert!(session.spool_path.exists());
    assert!(drive.entries().get(&p("bad.bin")).unwrap().is_none());
}

#[test]
fn empty_file_upload_needs_no_chunks() {
    let (_dir, drive) = drive();
    let done = upload(&drive, "empty.txt", b"", 0);
    assert_eq!(done.entry.size, 0);
    assert_eq!(done.entry.content_hash, Some(0));
}

#[test]
fn init_validation() {
    let (_dir, drive) = drive();
    let bad = |rel_path: &str, size: i64, mtime: i64| {
        drive
            .init_upload(InitUpload {
                rel_path: rel_path.into(),
                size,
                mtime,
                ..Default::default()
            })
            .unwrap_err()
    };
    assert!(matches!(bad("../x", 1, 1), CoreError::InvalidPath { .. }));
    assert!(matches!(bad("", 1, 1), CoreError::InvalidPath { .. }));
    assert!(matches!(bad("ok", -1, 1), CoreError::InvalidMetadata { .. }));
    assert!(matches!(bad("ok", 1, -1), CoreError::InvalidMetadata { .. }));
    assert!(fs::read_dir(drive.root().tmp_dir()).unwrap().next().is_none());
}

#[test]
fn delete_live_then_absent() {
    let (_dir, drive) = drive();
    upload(&drive, "x/y.txt", b"payload", 0);
    let blob = drive.resolve_file(&p("x/y.txt")).unwrap().location;

    let first = drive.delete("x/y.txt", Some("dev".into())).unwrap();
    assert!(!first.already_deleted);
    assert_eq!(first.rev, 2);
    assert_eq!(first.blob_cleanup, Some(Cleanup::Removed));
    assert!(!blob.exists());

    let entry = drive.entries().get(&p("x/y.txt")).unwrap().unwrap();
    assert!(entry.deleted);
    assert_eq!(entry.deleted_size, Some(7));
    assert_eq!(entry.deleted_hash, Some(crc32_of_bytes(b"payload")));
    assert!(matches!(
        drive.resolve_file(&p("x/y.txt")),
        Err(CoreError::NotFound { .. })
    ));

    let second = drive.delete("x/y.txt", None).unwrap();
    assert!(second.already_deleted);
    assert_eq!(second.rev, 3);
    assert!(second.change_id > first.change_id);

    let page = drive.changes_since(0, None).unwrap();
    let revs: Vec<(ChangeAction, u64)> = page.changes.iter().map(|c| (c.action, c.rev)).collect();
    assert_eq!(
        revs,
        vec![
            (ChangeAction::Upsert, 1),
            (ChangeAction::Delete, 2),
            (ChangeAction::Delete, 3)
        ]
    );
    assert_eq!(page.changes[1].deleted_size, Some(7));
}

#[test]
fn delete_nonexistent_twice() {
    let (_dir, drive) = drive();
    let a = drive.delete("ghost.txt", None).unwrap();
    let b = drive.delete("ghost.txt", None).unwrap();
    assert!(a.already_deleted && b.already_deleted);
    assert_eq!((a.rev, b.rev), (1, 2));
    assert_eq!((a.change_id, b.change_id), (1, 2));
    assert!(a.blob_cleanup.is_none());
    assert!(drive.delete("../ghost", None).is_err());
}

#[test]
fn upload_after_delete_detects_stale_base() {
    let (_dir, drive) = drive();
    upload(&drive, "n.txt", b"1", 0);
    drive.delete("n.txt", None).unwrap();

    let again = upload(&drive, "n.txt", b"2", 1);
    assert_eq!(again.entry.rev, 3);
    assert_eq!(again.entry.rel_path, "n.txt");
}

#[test]
fn listing_scenario() {
    let (_dir, drive) = drive();
    upload(&drive, "a/x.txt", b"x", 0);
    upload(&drive, "a/y/z.txt", b"z", 0);

    let children = drive.list(Some(&p("a"))).unwrap();
    let shape: Vec<(&str, bool)> = children.iter().map(|c| (c.name.as_str(), c.is_dir)).collect();
    assert_eq!(shape, vec![("y", true), ("x.txt", false)]);

    let root = drive.list(None).unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].rel_path, "a");
}

#[test]
fn changes_limit_is_clamped() {
    let (_dir, drive) = drive();
    for i in 0..5 {
        drive.delete(&format!("p{i}"), None).unwrap();
    }
    assert_eq!(drive.changes_since(0, Some(2)).unwrap().changes.len(), 2);
    assert_eq!(drive.changes_since(0, Some(0)).unwrap().changes.len(), 5);
    assert_eq!(drive.changes_since(-10, Some(-1)).unwrap().changes.len(), 5);
    assert_eq!(drive.changes_since(3, None).unwrap().next_cursor, 5);
}

#[test]
fn state_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let drive = Drive::open(dir.path(), Config::default()).unwrap();
        upload(&drive, "keep.txt", b"kept", 0);
        let id = init(&drive, "partial.bin", b"abcdef", 0);
        drive.upload_chunk(&id, 0, b"abc").unwrap();
    }

    let drive = Drive::open(dir.path(), Config::default()).unwrap();
    let entry = drive.entries().get(&p("keep.txt")).unwrap().unwrap();
    assert_eq!(entry.rev, 1);
    assert_eq!(drive.changes().head().unwrap(), 1);

    let session = drive
        .meta()
        .uploads_idle_since(chrono::DateTime::<chrono::Utc>::MAX_UTC)
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(session.received_bytes, 3);
    drive.upload_chunk(&session.upload_id, 3, b"def").unwrap();
    let done = drive.finalize_upload(&session.upload_id).unwrap();
    assert_eq!(done.change_id, 2);
}

#[test]
fn root_is_exclusive() {
    let dir = tempdir().unwrap();
    let _drive = Drive::open(dir.path(), Config::default()).unwrap();
    assert!(Drive::open(dir.path(), Config::default()).is_err());
}

#[test]
fn sweeper_removes_only_idle_sessions() {
    let (_dir, drive) = drive();
    let old = init(&drive, "old.bin", b"abc", 0);
    let old_spool = drive.uploads().session(&old).unwrap().spool_path;

    let report = drive.sweep_stale_uploads(Duration::from_secs(3600)).unwrap();
    assert_eq!(report.sessions, 0);
    assert!(drive.uploads().session(&old).is_ok());

    std::thread::sleep(Duration::from_millis(20));
    let recent = init(&drive, "new.bin", b"abc", 0);
    let recent_session = drive.uploads().session(&recent).unwrap();

    let report = drive.sweep_uploads_before(recent_session.updated_at).unwrap();
    assert_eq!(report.sessions, 1);
    assert!(!old_spool.exists());
    assert!(matches!(
        drive.uploads().session(&old),
        Err(CoreError::UnknownUpload { .. })
    ));
    assert!(drive.uploads().session(&recent).is_ok());
    assert!(recent_session.spool_path.exists());

    let report = drive.sweep_stale_uploads(Duration::ZERO).unwrap();
    assert_eq!(report.sessions, 1);
    assert!(!recent_session.spool_path.exists());
}

#[test]
fn sweeper_removes_orphan_spools() {
    let (_dir, drive) = drive();
    let orphan = drive.root().spool_path("orphan");
    fs::write(&orphan, b"junk").unwrap();

    let report = drive
        .sweep_uploads_before(chrono::Utc::now() + chrono::Duration::hours(1))
        .unwrap();
    assert_eq!(report.sessions, 0);
    assert_eq!(report.spools_removed, 1);
    assert!(!orphan.exists());
}

/// Delegates to a [`MetaDb`] but can be told to fail commits.
struct FlakyMeta {
    inner: MetaDb,
    fail_commits: AtomicBool,
}

impl MetaStore for FlakyMeta {
    fn get_entry(&self, rel_path: &str) -> CoreResult<Option<Entry>> {
        self.inner.get_entry(rel_path)
    }

    fn put_entry(&self, entry: Entry) -> CoreResult<()> {
        self.inner.put_entry(entry)
    }

    fn live_entries_under(&self, prefix: Option<&str>) -> CoreResult<Vec<Entry>> {
        self.inner.live_entries_under(prefix)
    }

    fn append_change(&self, change: Change) -> CoreResult<u64> {
        self.inner.append_change(change)
    }

    fn changes_since(&self, cursor: u64, limit: usize) -> CoreResult<Vec<Change>> {
        self.inner.changes_since(cursor, limit)
    }

    fn last_change_id(&self) -> CoreResult<u64> {
        self.inner.last_change_id()
    }

    fn commit(
        &self,
        rel_path: &str,
        mutation: EntryMutation,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Committed> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(CoreError::journal("disk full"));
        }
        self.inner.commit(rel_path, mutation, device_id, now)
    }

    fn insert_upload(&self, session: UploadSession) -> CoreResult<()> {
        self.inner.insert_upload(session)
    }

    fn get_upload(&self, upload_id: &str) -> CoreResult<Option<UploadSession>> {
        self.inner.get_upload(upload_id)
    }

    fn advance_upload(
        &self,
        upload_id: &str,
        from: u64,
        to: u64,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        self.inner.advance_upload(upload_id, from, to, now)
    }

    fn remove_upload(&self, upload_id: &str) -> CoreResult<Option<UploadSession>> {
        self.inner.remove_upload(upload_id)
    }

    fn uploads_idle_since(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<UploadSession>> {
        self.inner.uploads_idle_since(cutoff)
    }

    fn insert_share(&self, share: Share) -> CoreResult<bool> {
        self.inner.insert_share(share)
    }

    fn get_share(&self, token: &str) -> CoreResult<Option<Share>> {
        self.inner.get_share(token)
    }

    fn remove_share(&self, token: &str) -> CoreResult<bool> {
        self.inner.remove_share(token)
    }
}

#[test]
fn finalize_can_be_retried_after_failed_commit() {
    let dir = tempdir().unwrap();
    let meta = Arc::new(FlakyMeta {
        inner: MetaDb::open_in_memory(),
        fail_commits: AtomicBool::new(false),
    });
    let root = StorageRoot::open(dir.path()).unwrap();
    let drive = Drive::with_meta(root, Arc::clone(&meta) as Arc<dyn MetaStore>, Config::default());

    let first = upload(&drive, "notes.txt", b"old", 0);
    assert_eq!(first.entry.rev, 1);

    let id = init(&drive, "notes.txt", b"newer", 1);
    drive.upload_chunk(&id, 0, b"newer").unwrap();

    meta.fail_commits.store(true, Ordering::SeqCst);
    let err = drive.finalize_upload(&id).unwrap_err();
    assert!(err.is_server_error());

    let session = drive.uploads().session(&id).unwrap();
    assert_eq!(fs::read(&session.spool_path).unwrap(), b"newer");
    let entry = drive.entries().get(&p("notes.txt")).unwrap().unwrap();
    assert_eq!(entry.rev, 1);

    meta.fail_commits.store(false, Ordering::SeqCst);
    let retried = drive.finalize_upload(&id).unwrap();
    assert_eq!(retried.entry.rev, 2);
    assert_eq!(retried.entry.rel_path, "notes.txt");
    assert_eq!(retried.entry.content_hash, Some(crc32_of_bytes(b"newer")));
    let location = retried.entry.storage_location.unwrap();
    assert_eq!(fs::read(location).unwrap(), b"newer");
    assert!(drive.uploads().session(&id).is_err());
}
