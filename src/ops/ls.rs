use crate::error::Result;
use crate::snapshots::load_snapshot;
use crate::store::Store;
use crate::types::SnapshotEntry;

/// list the entries of a snapshot in path order
pub fn ls(store: &Store, id: &str) -> Result<Vec<SnapshotEntry>> {
    let snapshot = load_snapshot(store, id)?;

    Ok(snapshot
        .into_entries()
        .into_iter()
        .map(|(path, hash)| SnapshotEntry::new(path, hash))
        .collect())
}
