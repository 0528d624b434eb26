//! Conflict detection and conflict-path naming.
//!
//! Deciding where an upload lands is a pure function of the current live
//! revision, the client's base revision and its device label.

use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use drivesync_storage::NormalizedPath;

/// Label used when a device sends none (or one that sanitizes to nothing).
pub const DEFAULT_DEVICE_LABEL: &str = "device";

/// Where an upload will land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDecision {
    /// Destination path.
    pub path: NormalizedPath,
    /// True if the destination was renamed because of a conflict.
    pub conflicted: bool,
}

/// Decides the destination for an upload of `requested`.
///
/// `live_rev` is the revision of the current live entry, or `None` if the
/// path is absent or tombstoned. A live entry whose revision differs from
/// `base_rev` means the client is stale, and the upload is diverted to a
/// conflict path.
///
/// # Errors
///
/// Returns an error if the conflict path does not normalize (too long).
pub fn decide_path(
    requested: &NormalizedPath,
    live_rev: Option<u64>,
    base_rev: u64,
    device_label: &str,
    now: DateTime<Utc>,
) -> CoreResult<PathDecision> {
    match live_rev {
        Some(rev) if rev != base_rev => Ok(PathDecision {
            path: conflict_path(requested, device_label, now)?,
            conflicted: true,
        }),
        _ => Ok(PathDecision {
            path: requested.clone(),
            conflicted: false,
        }),
    }
}

/// Builds `"<stem> (conflict from <label> <YYYY-MM-DD_HH-MM-SS>)<.ext>"`.
///
/// The marker goes before the extension of the last segment; names without
/// one (including dot-files) get it appended.
///
/// # Errors
///
/// Returns an error if the result does not normalize.
pub fn conflict_path(
    path: &NormalizedPath,
    device_label: &str,
    now: DateTime<Utc>,
) -> CoreResult<NormalizedPath> {
    let marker = format!(
        " (conflict from {} {})",
        sanitize_label(device_label),
        now.format("%Y-%m-%d_%H-%M-%S")
    );

    let full = path.as_str();
    let name_start = full.rfind('/').map_or(0, |i| i + 1);
    let candidate = match full[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let at = name_start + dot;
            format!("{}{marker}{}", &full[..at], &full[at..])
        }
        _ => format!("{full}{marker}"),
    };

    Ok(NormalizedPath::parse(&candidate)?)
}

/// Restricts a device label to `[A-Za-z0-9 _.-]`, replacing anything else
/// with `_`. Blank labels become [`DEFAULT_DEVICE_LABEL`].
#[must_use]
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_DEVICE_LABEL.to_string()
    } else {
        cleaned
    }
}
