//! Relative path normalization and sandboxed joining.
//!
//! Every externally supplied path (entry lookups, upload destinations,
//! share scopes, listings) goes through [`NormalizedPath::parse`]. The
//! result contains only plain `/`-separated segments and can be used both
//! as a unique key and as a suffix under a storage root.
//!
//! [`join_private`] is the second, independent check: it joins a normalized
//! path under a base directory and re-verifies that the result still lies
//! strictly inside that base.

use crate::error::{StorageError, StorageResult};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Maximum length of a normalized path, in bytes.
pub const MAX_PATH_LEN: usize = 2048;

/// A validated, canonical relative path.
///
/// Guarantees: non-empty, no control characters, no empty, `.` or `..`
/// segments, `/` as the only separator, at most [`MAX_PATH_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// Normalizes a raw client path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] if the path is empty, contains
    /// control characters or traversal segments, or is too long.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let unified = raw.replace('\\', "/");
        let trimmed = unified.trim();

        let mut collapsed = String::with_capacity(trimmed.len());
        let mut last_was_sep = false;
        for ch in trimmed.chars() {
            if ch == '/' {
                if last_was_sep {
                    continue;
                }
                last_was_sep = true;
            } else {
                last_was_sep = false;
            }
            collapsed.push(ch);
        }
        let p = collapsed.strip_prefix('/').unwrap_or(&collapsed);

        if p.is_empty() || p == "." {
            return Err(StorageError::invalid_path("path is empty"));
        }
        if p.chars().any(|c| c.is_ascii_control()) {
            return Err(StorageError::invalid_path("path contains control characters"));
        }
        if p.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(StorageError::invalid_path(
                "path contains empty, '.' or '..' segments",
            ));
        }
        if p.len() > MAX_PATH_LEN {
            return Err(StorageError::invalid_path("path is too long"));
        }

        Ok(Self(p.to_string()))
    }

    /// Parses an optional directory path where empty input means the root.
    ///
    /// Trailing separators are ignored, so `docs/` names the same directory
    /// as `docs`.
    ///
    /// # Errors
    ///
    /// Same as [`NormalizedPath::parse`] for non-blank input.
    pub fn parse_dir(raw: &str) -> StorageResult<Option<Self>> {
        let raw = raw.trim().trim_end_matches(['/', '\\']);
        if raw.is_empty() {
            return Ok(None);
        }
        Self::parse(raw).map(Some)
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Returns the last segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns true if `self` equals `other` or lies beneath it.
    #[must_use]
    pub fn is_within(&self, other: &NormalizedPath) -> bool {
        self == other
            || (self.0.len() > other.0.len()
                && self.0.starts_with(other.as_str())
                && self.0.as_bytes()[other.0.len()] == b'/')
    }

    /// Consumes the path, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for NormalizedPath {
    type Error = StorageError;

    fn try_from(value: &str) -> StorageResult<Self> {
        Self::parse(value)
    }
}

/// Joins a normalized path under `base` and verifies the result stays inside it.
///
/// Two checks run: a lexical one on the joined components, and, for the
/// deepest ancestor that already exists on disk, a resolved one that
/// follows symlinks.
///
/// # Errors
///
/// Returns [`StorageError::OutsideRoot`] if the joined path is not strictly
/// within `base`.
pub fn join_private(base: &Path, rel: &NormalizedPath) -> StorageResult<PathBuf> {
    let mut full = base.to_path_buf();
    for seg in rel.segments() {
        full.push(seg);
    }

    let outside = || StorageError::OutsideRoot { path: full.clone() };

    let rest = full.strip_prefix(base).map_err(|_| outside())?;
    if rest.as_os_str().is_empty()
        || rest.components().any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(outside());
    }

    if let Ok(canonical_base) = base.canonicalize() {
        let mut ancestor = full.as_path();
        loop {
            if ancestor.exists() {
                let resolved = ancestor.canonicalize()?;
                if !resolved.starts_with(&canonical_base) {
                    return Err(outside());
                }
                break;
            }
            match ancestor.parent() {
                Some(parent) if parent.starts_with(base) => ancestor = parent,
                _ => break,
            }
        }
    }

    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn norm(raw: &str) -> Option<String> {
        NormalizedPath::parse(raw).ok().map(NormalizedPath::into_string)
    }

    #[test]
    fn accepts_plain_paths() {
        assert_eq!(norm("a/b/c.txt").as_deref(), Some("a/b/c.txt"));
        assert_eq!(norm("  /docs//report.pdf ").as_deref(), Some("docs/report.pdf"));
        assert_eq!(norm("docs\\sub\\x.bin").as_deref(), Some("docs/sub/x.bin"));
        assert_eq!(norm("//lead").as_deref(), Some("lead"));
    }

    #[test]
    fn rejects_traversal_and_garbage() {
        assert!(norm("../x").is_none());
        assert!(norm("").is_none());
        assert!(norm("   ").is_none());
        assert!(norm(".").is_none());
        assert!(norm("/").is_none());
        assert!(norm("a/../b").is_none());
        assert!(norm("a/./b").is_none());
        assert!(norm("a/b/").is_none());
        assert!(norm("a\0b").is_none());
        assert!(norm("a\x7fb").is_none());
        assert!(norm("tab\there").is_none());
        assert!(norm(&"x".repeat(3000)).is_none());
    }

    #[test]
    fn length_limit_is_inclusive() {
        assert!(norm(&"y".repeat(MAX_PATH_LEN)).is_some());
        assert!(norm(&"y".repeat(MAX_PATH_LEN + 1)).is_none());
    }

    #[test]
    fn parse_dir_treats_blank_as_root() {
        assert_eq!(NormalizedPath::parse_dir("").unwrap(), None);
        assert_eq!(NormalizedPath::parse_dir("  ").unwrap(), None);
        assert!(NormalizedPath::parse_dir("a/..").is_err());
        assert_eq!(NormalizedPath::parse_dir("/").unwrap(), None);
        assert_eq!(
            NormalizedPath::parse_dir("/a/").unwrap().map(NormalizedPath::into_string),
            Some("a".to_string())
        );
    }

    #[test]
    fn within_requires_segment_boundary() {
        let scope = NormalizedPath::parse("docs").unwrap();
        assert!(NormalizedPath::parse("docs").unwrap().is_within(&scope));
        assert!(NormalizedPath::parse("docs/a.txt").unwrap().is_within(&scope));
        assert!(!NormalizedPath::parse("docsx/a.txt").unwrap().is_within(&scope));
        assert!(!NormalizedPath::parse("doc").unwrap().is_within(&scope));
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(NormalizedPath::parse("a/b/c.txt").unwrap().file_name(), "c.txt");
        assert_eq!(NormalizedPath::parse("solo").unwrap().file_name(), "solo");
    }

    #[test]
    fn join_private_stays_inside_base() {
        let dir = tempfile::tempdir().unwrap();
        let rel = NormalizedPath::parse("a/b.txt").unwrap();
        let full = join_private(dir.path(), &rel).unwrap();
        assert!(full.starts_with(dir.path()));
        assert!(full.ends_with("a/b.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn join_private_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), base.path().join("link")).unwrap();

        let rel = NormalizedPath::parse("link/secret.txt").unwrap();
        let err = join_private(base.path(), &rel).unwrap_err();
        assert!(matches!(err, StorageError::OutsideRoot { .. }));
    }

    proptest! {
        #[test]
        fn accepted_paths_have_no_traversal(raw in "[a-z./\\\\ ]{0,40}") {
            if let Ok(p) = NormalizedPath::parse(&raw) {
                prop_assert!(p.segments().all(|s| !s.is_empty() && s != "." && s != ".."));
                prop_assert!(!p.as_str().starts_with('/'));
                prop_assert!(!p.as_str().contains('\\'));
            }
        }

        #[test]
        fn normalization_is_idempotent(raw in "[a-zA-Z0-9_./-]{1,60}") {
            if let Ok(p) = NormalizedPath::parse(&raw) {
                let again = NormalizedPath::parse(p.as_str()).unwrap();
                prop_assert_eq!(again, p);
            }
        }
    }
}
