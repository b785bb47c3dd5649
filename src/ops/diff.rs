use tracing::info;

use crate::error::{Error, Result};
use crate::snapshots::load_snapshot;
use crate::store::Store;
use crate::types::{DiffResult, Snapshot};

/// compare two stored snapshots by id
///
/// both ids are looked up before failing, so a `SnapshotNotFound` error
/// names every id that was never built.
pub fn diff(store: &Store, id_a: &str, id_b: &str) -> Result<DiffResult> {
    let mut missing = Vec::new();

    let a = load_side(store, id_a, &mut missing)?;
    let b = load_side(store, id_b, &mut missing)?;
    missing.dedup();

    match (a, b) {
        (Some(a), Some(b)) => {
            let result = diff_snapshots(&a, &b);
            info!(
                id_a,
                id_b,
                added = result.summary.added,
                deleted = result.summary.deleted,
                modified = result.summary.modified,
                "diffed snapshots"
            );
            Ok(result)
        }
        _ => Err(Error::SnapshotNotFound(missing)),
    }
}

/// load a snapshot, recording its id instead of failing when it was never built
fn load_side(store: &Store, id: &str, missing: &mut Vec<String>) -> Result<Option<Snapshot>> {
    match load_snapshot(store, id) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(Error::SnapshotNotFound(ids)) => {
            missing.extend(ids);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// classify every path of two snapshots
///
/// added: only in `b`. deleted: only in `a`. modified: in both with
/// different hashes. lists come out sorted by path.
pub fn diff_snapshots(a: &Snapshot, b: &Snapshot) -> DiffResult {
    let mut added = Vec::new();
    let mut modified = Vec::new();

    for (path, hash_b) in b.iter() {
        match a.get(path) {
            None => added.push(path.to_string()),
            Some(hash_a) if hash_a != hash_b => modified.push(path.to_string()),
            Some(_) => {}
        }
    }

    let deleted = a
        .iter()
        .filter(|(path, _)| !b.contains(path))
        .map(|(path, _)| path.to_string())
        .collect();

    DiffResult::new(added, deleted, modified)
}
