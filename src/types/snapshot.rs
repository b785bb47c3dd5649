use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::store::validate_snapshot_id;

/// a complete inventory of one directory tree: relative path -> content hash
///
/// paths are unique and kept in byte order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    id: String,
    entries: BTreeMap<String, Hash>,
}

impl Snapshot {
    /// create a snapshot, validating the id and every entry path
    pub fn new(id: impl Into<String>, entries: Vec<SnapshotEntry>) -> Result<Self> {
        let id = id.into();
        validate_snapshot_id(&id)?;

        let mut map = BTreeMap::new();
        for entry in entries {
            validate_entry_path(&entry.path)?;
            if map.contains_key(&entry.path) {
                return Err(Error::DuplicateEntryPath(entry.path));
            }
            map.insert(entry.path, entry.hash);
        }

        Ok(Self { id, entries: map })
    }

    /// create a snapshot with no entries
    pub fn empty(id: impl Into<String>) -> Result<Self> {
        Self::new(id, vec![])
    }

    /// rebuild from a decoded mapping
    pub(crate) fn from_map(id: String, entries: BTreeMap<String, Hash>) -> Result<Self> {
        validate_snapshot_id(&id)?;
        for path in entries.keys() {
            validate_entry_path(path)?;
        }
        Ok(Self { id, entries })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// path -> hash mapping
    pub fn entries(&self) -> &BTreeMap<String, Hash> {
        &self.entries
    }

    pub fn into_entries(self) -> BTreeMap<String, Hash> {
        self.entries
    }

    /// look up the hash recorded for a path
    pub fn get(&self, path: &str) -> Option<&Hash> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// iterate entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Hash)> {
        self.entries.iter().map(|(p, h)| (p.as_str(), h))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// one recorded file: `/`-separated path relative to the snapshot root
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotEntry {
    pub path: String,
    pub hash: Hash,
}

impl SnapshotEntry {
    pub fn new(path: impl Into<String>, hash: Hash) -> Self {
        Self {
            path: path.into(),
            hash,
        }
    }
}

impl std::fmt::Display for SnapshotEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.hash, self.path)
    }
}

/// validate a relative entry path
fn validate_entry_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::InvalidEntryPath("empty path".to_string()));
    }

    if path.starts_with('/') || path.ends_with('/') {
        return Err(Error::InvalidEntryPath(format!(
            "path cannot start or end with '/': {}",
            path
        )));
    }

    if path.contains('\0') {
        return Err(Error::InvalidEntryPath(format!(
            "path contains null byte: {}",
            path.escape_default()
        )));
    }

    for component in path.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(Error::InvalidEntryPath(format!(
                "path has empty, '.' or '..' segment: {}",
                path
            )));
        }
    }

    Ok(())
}
