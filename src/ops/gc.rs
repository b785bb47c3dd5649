use std::fs;
use std::time::{Duration, SystemTime};

use tracing::info;

use crate::error::{IoResultExt, Result};
use crate::snapshots::snapshot_exists;
use crate::store::{decode_id, validate_snapshot_id, Store};

/// temp files younger than this may belong to a running build
pub const STALE_TMP_AGE: Duration = Duration::from_secs(60 * 60);

/// gc statistics
#[derive(Debug, Default)]
pub struct GcStats {
    pub tmp_files_removed: usize,
    pub lock_files_removed: usize,
    pub bytes_freed: u64,
}

/// remove temp files left behind by interrupted builds, and idle lock files
/// of snapshots that no longer exist
pub fn gc(store: &Store, dry_run: bool) -> Result<GcStats> {
    gc_older_than(store, STALE_TMP_AGE, dry_run)
}

/// remove temp files whose last modification is older than `min_age`
pub fn gc_older_than(store: &Store, min_age: Duration, dry_run: bool) -> Result<GcStats> {
    let mut stats = GcStats::default();
    let tmp_dir = store.tmp_path();
    let now = SystemTime::now();

    for entry in fs::read_dir(&tmp_dir).with_path(&tmp_dir)? {
        let entry = entry.with_path(&tmp_dir)?;
        let path = entry.path();
        let meta = entry.metadata().with_path(&path)?;

        if !meta.is_file() {
            continue;
        }

        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < min_age {
            continue;
        }

        if !dry_run {
            fs::remove_file(&path).with_path(&path)?;
        }
        stats.tmp_files_removed += 1;
        stats.bytes_freed += meta.len();
    }

    stats.lock_files_removed = gc_locks(store, dry_run)?;

    info!(
        removed = stats.tmp_files_removed,
        locks_removed = stats.lock_files_removed,
        bytes = stats.bytes_freed,
        dry_run,
        "gc complete"
    );
    Ok(stats)
}

/// remove lock files with no snapshot record; held locks are left alone
fn gc_locks(store: &Store, dry_run: bool) -> Result<usize> {
    let locks_dir = store.locks_path();
    let mut removed = 0;

    for entry in fs::read_dir(&locks_dir).with_path(&locks_dir)? {
        let entry = entry.with_path(&locks_dir)?;
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some("lock") {
            continue;
        }

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(decode_id)
            .filter(|id| validate_snapshot_id(id).is_ok());

        let Some(id) = id else {
            // no snapshot can ever lock this name
            if !dry_run {
                fs::remove_file(&path).with_path(&path)?;
            }
            removed += 1;
            continue;
        };

        if snapshot_exists(store, &id) {
            continue;
        }

        // held by a running build or delete
        let Some(lock) = store.try_lock_snapshot(&id)? else {
            continue;
        };

        // a build may have finished between the check and the lock
        if snapshot_exists(store, &id) {
            continue;
        }

        if !dry_run {
            lock.remove()?;
        }
        removed += 1;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::init(&dir.path().join("store")).unwrap();
        (dir, store)
    }

    fn age_file(path: &std::path::Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_gc_removes_stale_tmp() {
        let (_dir, store) = test_store();

        let stale = store.tmp_path().join("stale");
        let fresh = store.tmp_path().join("fresh");
        fs::write(&stale, b"12345").unwrap();
        fs::write(&fresh, b"abc").unwrap();
        age_file(&stale, Duration::from_secs(2 * 60 * 60));

        let stats = gc(&store, false).unwrap();
        assert_eq!(stats.tmp_files_removed, 1);
        assert_eq!(stats.bytes_freed, 5);
        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_gc_dry_run() {
        let (_dir, store) = test_store();

        let stale = store.tmp_path().join("stale");
        fs::write(&stale, b"xy").unwrap();

        let stats = gc_older_than(&store, Duration::ZERO, true).unwrap();
        assert_eq!(stats.tmp_files_removed, 1);
        assert_eq!(stats.bytes_freed, 2);
        assert!(stale.exists());
    }

    #[test]
    fn test_gc_removes_orphan_locks() {
        let (_dir, store) = test_store();

        // delete leaves its lock file behind
        crate::snapshots::replace_snapshot(&store, &crate::Snapshot::empty("gone").unwrap()).unwrap();
        crate::snapshots::delete_snapshot(&store, "gone").unwrap();
        drop(store.try_lock_snapshot("ghost").unwrap());
        fs::write(store.locks_path().join("not-hex.lock"), b"").unwrap();

        crate::snapshots::replace_snapshot(&store, &crate::Snapshot::empty("kept").unwrap()).unwrap();

        let stats = gc(&store, true).unwrap();
        assert_eq!(stats.lock_files_removed, 3);
        assert!(store.lock_path("gone").exists());

        let stats = gc(&store, false).unwrap();
        assert_eq!(stats.lock_files_removed, 3);
        assert!(!store.lock_path("gone").exists());
        assert!(!store.lock_path("ghost").exists());
        assert!(!store.locks_path().join("not-hex.lock").exists());
        assert!(store.lock_path("kept").exists());

        // ids remain lockable after their lock file is gone
        let lock = store.lock_snapshot("gone").unwrap();
        assert!(store.try_lock_snapshot("gone").unwrap().is_none());
        drop(lock);
    }

    #[test]
    fn test_gc_skips_held_locks() {
        let (_dir, store) = test_store();

        let lock = store.lock_snapshot("building").unwrap();

        let stats = gc(&store, false).unwrap();
        assert_eq!(stats.lock_files_removed, 0);
        assert!(store.lock_path("building").exists());

        drop(lock);
        let stats = gc(&store, false).unwrap();
        assert_eq!(stats.lock_files_removed, 1);
    }

    #[test]
    fn test_gc_leaves_snapshots_alone() {
        let (_dir, store) = test_store();
        crate::snapshots::replace_snapshot(&store, &crate::Snapshot::empty("S1").unwrap()).unwrap();

        let stats = gc_older_than(&store, Duration::ZERO, false).unwrap();
        assert_eq!(stats.tmp_files_removed, 0);
        assert!(crate::snapshots::snapshot_exists(&store, "S1"));
    }
}
