//! Reclamation of abandoned upload sessions.

use crate::drive::Drive;
use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use drivesync_storage::Cleanup;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Session rows deleted.
    pub sessions: usize,
    /// Spool files removed (with or without a session).
    pub spools_removed: usize,
    /// Removals that failed and will be retried next sweep.
    pub failures: usize,
}

impl Drive {
    /// Removes upload sessions idle for longer than `max_age`, with their
    /// spool files, plus spool files that no session references.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails. Filesystem cleanup
    /// failures are counted, not returned.
    pub fn sweep_stale_uploads(&self, max_age: Duration) -> CoreResult<SweepReport> {
        let age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.sweep_uploads_before(cutoff)
    }

    /// Removes upload sessions last updated before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn sweep_uploads_before(&self, cutoff: DateTime<Utc>) -> CoreResult<SweepReport> {
        let mut report = SweepReport::default();

        for stale in self.meta.uploads_idle_since(cutoff)? {
            let _guard = self.uploads.lock_upload(&stale.upload_id);
            // A chunk may have landed since the scan.
            match self.meta.get_upload(&stale.upload_id)? {
                Some(current) if current.updated_at < cutoff => {}
                _ => continue,
            }
            if self.meta.remove_upload(&stale.upload_id)?.is_none() {
                continue;
            }
            report.sessions += 1;
            tally(&mut report, self.root.discard(&stale.spool_path));
            debug!(upload_id = %stale.upload_id, "abandoned upload swept");
        }

        self.sweep_orphan_spools(cutoff, &mut report);

        if report != SweepReport::default() {
            info!(
                sessions = report.sessions,
                spools = report.spools_removed,
                failures = report.failures,
                "upload sweep finished"
            );
        }
        Ok(report)
    }

    fn sweep_orphan_spools(&self, cutoff: DateTime<Utc>, report: &mut SweepReport) {
        let dir = match fs::read_dir(self.root.tmp_dir()) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "cannot scan spool directory");
                report.failures += 1;
                return;
            }
        };
        let known: HashSet<String> = match self.meta.uploads_idle_since(DateTime::<Utc>::MAX_UTC) {
            Ok(sessions) => sessions.into_iter().map(|s| s.upload_id).collect(),
            Err(e) => {
                warn!(error = %e, "cannot list sessions, skipping orphan spools");
                return;
            }
        };

        for item in dir.filter_map(Result::ok) {
            let path = item.path();
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".part"))
            else {
                continue;
            };
            if known.contains(id) {
                continue;
            }
            let modified = item
                .metadata()
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from);
            if matches!(modified, Ok(at) if at < cutoff) {
                tally(report, self.root.discard(&path));
            }
        }
    }
}

fn tally(report: &mut SweepReport, cleanup: Cleanup) {
    match cleanup {
        Cleanup::Removed => report.spools_removed += 1,
        Cleanup::Missing => {}
        Cleanup::Failed => report.failures += 1,
    }
}
