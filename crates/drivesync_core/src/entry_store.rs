//! The Entry Store: authoritative per-path state and derived listings.

use crate::error::CoreResult;
use crate::meta::MetaStore;
use crate::types::{ChildSummary, Entry};
use drivesync_storage::NormalizedPath;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Query surface over entry rows.
#[derive(Clone)]
pub struct EntryStore {
    meta: Arc<dyn MetaStore>,
}

impl EntryStore {
    /// Creates an entry store over a metadata backend.
    pub fn new(meta: Arc<dyn MetaStore>) -> Self {
        Self { meta }
    }

    /// Returns the entry for a path, live or tombstoned.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn get(&self, path: &NormalizedPath) -> CoreResult<Option<Entry>> {
        self.meta.get_entry(path.as_str())
    }

    /// Returns the entry for a path only if it is live.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn get_live(&self, path: &NormalizedPath) -> CoreResult<Option<Entry>> {
        Ok(self.get(path)?.filter(Entry::is_live))
    }

    /// Inserts or fully replaces an entry, keyed by its path.
    ///
    /// Revision bookkeeping is the caller's job; mutations that must also
    /// be logged go through [`MetaStore::commit`] instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn upsert(&self, entry: Entry) -> CoreResult<()> {
        self.meta.put_entry(entry)
    }

    /// Lists the immediate children of a directory (`None` for the root).
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub fn list_children(&self, dir: Option<&NormalizedPath>) -> CoreResult<Vec<ChildSummary>> {
        let prefix = dir.map(NormalizedPath::as_str);
        let entries = self.meta.live_entries_under(prefix)?;
        Ok(derive_children(prefix, &entries))
    }
}

/// Derives the children of `prefix` from the live entries beneath it.
///
/// A child is a directory if any entry continues past its name. Children
/// are deduplicated by name; directories sort before files, then names
/// compare case-insensitively.
pub fn derive_children(prefix: Option<&str>, entries: &[Entry]) -> Vec<ChildSummary> {
    let base = prefix.map(|p| format!("{p}/"));
    let mut children: Vec<ChildSummary> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for entry in entries.iter().filter(|e| e.is_live()) {
        let rest = match &base {
            Some(base) => match entry.rel_path.strip_prefix(base.as_str()) {
                Some(rest) => rest,
                None => continue,
            },
            None => entry.rel_path.as_str(),
        };
        let (name, deeper) = match rest.split_once('/') {
            Some((name, _)) => (name, true),
            None => (rest, false),
        };
        if name.is_empty() {
            continue;
        }
        let is_dir = deeper || entry.is_dir;

        if let Some(&idx) = by_name.get(name) {
            if is_dir {
                let child = &mut children[idx];
                child.is_dir = true;
                child.size = None;
                child.mtime = None;
                child.content_hash = None;
            }
            continue;
        }

        let rel_path = match prefix {
            Some(p) => format!("{p}/{name}"),
            None => name.to_string(),
        };
        by_name.insert(name.to_string(), children.len());
        children.push(ChildSummary {
            name: name.to_string(),
            rel_path,
            is_dir,
            rev: entry.rev,
            size: (!is_dir).then_some(entry.size),
            mtime: (!is_dir).then_some(entry.mtime),
            content_hash: if is_dir { None } else { entry.content_hash },
        });
    }

    children.sort_by(compare_children);
    children
}

fn compare_children(a: &ChildSummary, b: &ChildSummary) -> Ordering {
    b.is_dir
        .cmp(&a.is_dir)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}
