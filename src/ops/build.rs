use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fs::{collect_files, validate_root, SourceFile, SymlinkPolicy};
use crate::hash::hash_file;
use crate::snapshots::replace_snapshot_locked;
use crate::store::{validate_snapshot_id, Store};
use crate::types::{Snapshot, SnapshotEntry};

/// per-build overrides of the store configuration
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// hashing worker limit (store config if None)
    pub workers: Option<usize>,
    /// follow symlinks while walking (store config if None)
    pub follow_symlinks: Option<bool>,
    /// set to true from another thread to abort the build
    pub cancel: Option<Arc<AtomicBool>>,
}

impl BuildOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// snapshot a directory tree under an id, replacing any previous snapshot with that id
///
/// returns the number of files recorded.
pub fn build(store: &Store, root: &Path, id: &str) -> Result<usize> {
    build_with_options(store, root, id, &BuildOptions::default())
}

/// snapshot a directory tree with explicit options
///
/// the id's lock is held for the whole build. any read failure or
/// cancellation leaves the previous snapshot for `id` untouched.
pub fn build_with_options(
    store: &Store,
    root: &Path,
    id: &str,
    options: &BuildOptions,
) -> Result<usize> {
    validate_snapshot_id(id)?;
    validate_root(root)?;

    let config = &store.config().build;
    let workers = options.workers.unwrap_or(config.workers).max(1);
    let policy = if options.follow_symlinks.unwrap_or(config.follow_symlinks) {
        SymlinkPolicy::Follow
    } else {
        SymlinkPolicy::Skip
    };

    let lock = store.lock_snapshot(id)?;
    info!(id, root = %root.display(), workers, "building snapshot");

    let files = collect_files(root, policy)?;
    debug!(id, files = files.len(), "walk complete");

    let entries = hash_files(&files, workers, id, options)?;
    let snapshot = Snapshot::new(id, entries)?;

    if options.is_cancelled() {
        return Err(Error::Cancelled(id.to_string()));
    }

    replace_snapshot_locked(store, &lock, &snapshot)?;

    info!(id, files = snapshot.len(), "snapshot built");
    Ok(snapshot.len())
}

/// hash files on a bounded worker pool, preserving input order
fn hash_files(
    files: &[SourceFile],
    workers: usize,
    id: &str,
    options: &BuildOptions,
) -> Result<Vec<SnapshotEntry>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("snapdiff-hash-{}", i))
        .build()?;

    pool.install(|| {
        files
            .par_iter()
            .map(|file| {
                if options.is_cancelled() {
                    return Err(Error::Cancelled(id.to_string()));
                }
                let hash = hash_file(&file.abs_path)?;
                Ok(SnapshotEntry::new(file.rel_path.clone(), hash))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::snapshots::{load_snapshot, snapshot_exists};
    use std::fs;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::init(&dir.path().join("store")).unwrap();
        (dir, store)
    }

    fn source_tree(dir: &Path, name: &str, files: &[(&str, &str)]) -> std::path::PathBuf {
        let root = dir.join(name);
        fs::create_dir_all(&root).unwrap();
        for (path, content) in files {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        root
    }

    #[test]
    fn test_build_two_files() {
        let (dir, store) = test_store();
        let root = source_tree(dir.path(), "src", &[("a.txt", "hello"), ("b.txt", "world")]);

        let count = build(&store, &root, "S1").unwrap();
        assert_eq!(count, 2);

        let snap = load_snapshot(&store, "S1").unwrap();
        assert_eq!(
            snap.get("a.txt").unwrap().to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(snap.get("b.txt"), Some(&Hash::of_bytes(b"world")));
    }

    #[test]
    fn test_build_nested_paths_use_slashes() {
        let (dir, store) = test_store();
        let root = source_tree(dir.path(), "src", &[("x/y/z.txt", "deep"), ("top", "t")]);

        build(&store, &root, "nested").unwrap();

        let snap = load_snapshot(&store, "nested").unwrap();
        let paths: Vec<&str> = snap.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["top", "x/y/z.txt"]);
    }

    #[test]
    fn test_build_empty_directory() {
        let (dir, store) = test_store();
        let root = source_tree(dir.path(), "empty", &[]);

        assert_eq!(build(&store, &root, "S1").unwrap(), 0);
        assert!(load_snapshot(&store, "S1").unwrap().is_empty());
    }

    #[test]
    fn test_build_is_deterministic() {
        let (dir, store) = test_store();
        let root = source_tree(dir.path(), "src", &[("a", "1"), ("d/b", "2"), ("d/c", "3")]);

        build(&store, &root, "S1").unwrap();
        let first = load_snapshot(&store, "S1").unwrap();
        build(&store, &root, "S1").unwrap();
        let second = load_snapshot(&store, "S1").unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_rebuild_replaces_entries() {
        let (dir, store) = test_store();
        let t1 = source_tree(dir.path(), "t1", &[("stale.txt", "old"), ("shared.txt", "v1")]);
        let t2 = source_tree(dir.path(), "t2", &[("shared.txt", "v2"), ("fresh.txt", "new")]);

        build(&store, &t1, "S").unwrap();
        build(&store, &t2, "S").unwrap();

        let snap = load_snapshot(&store, "S").unwrap();
        let paths: Vec<&str> = snap.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["fresh.txt", "shared.txt"]);
        assert_eq!(snap.get("shared.txt"), Some(&Hash::of_bytes(b"v2")));
    }

    #[test]
    fn test_build_rejects_bad_arguments() {
        let (dir, store) = test_store();
        let root = source_tree(dir.path(), "src", &[("a", "a")]);

        assert!(matches!(build(&store, &root, ""), Err(Error::EmptySnapshotId)));
        assert!(matches!(
            build(&store, &dir.path().join("missing"), "S1"),
            Err(Error::RootNotFound(_))
        ));
        assert!(!snapshot_exists(&store, "S1"));
    }

    #[test]
    fn test_read_failure_keeps_previous_snapshot() {
        let (dir, store) = test_store();
        let good = source_tree(dir.path(), "good", &[("a.txt", "hello")]);
        let bad = source_tree(dir.path(), "bad", &[("b.txt", "world")]);
        symlink("/does/not/exist", bad.join("dangling")).unwrap();

        build(&store, &good, "S1").unwrap();

        let options = BuildOptions {
            follow_symlinks: Some(true),
            ..Default::default()
        };
        let result = build_with_options(&store, &bad, "S1", &options);
        assert!(matches!(result, Err(Error::ReadFailure { .. })));

        let snap = load_snapshot(&store, "S1").unwrap();
        assert_eq!(snap.len(), 1);
        assert!(snap.contains("a.txt"));

        // lock was released on the failure path
        assert!(store.try_lock_snapshot("S1").unwrap().is_some());
    }

    #[test]
    fn test_read_failure_on_first_build_leaves_nothing() {
        let (dir, store) = test_store();
        let bad = source_tree(dir.path(), "bad", &[]);
        symlink("/does/not/exist", bad.join("dangling")).unwrap();

        let options = BuildOptions {
            follow_symlinks: Some(true),
            ..Default::default()
        };
        assert!(build_with_options(&store, &bad, "S1", &options).is_err());
        assert!(!snapshot_exists(&store, "S1"));
    }

    #[test]
    fn test_cancelled_build_keeps_previous_snapshot() {
        let (dir, store) = test_store();
        let t1 = source_tree(dir.path(), "t1", &[("a.txt", "hello")]);
        let t2 = source_tree(dir.path(), "t2", &[("b.txt", "world")]);

        build(&store, &t1, "S1").unwrap();

        let options = BuildOptions {
            cancel: Some(Arc::new(AtomicBool::new(true))),
            ..Default::default()
        };
        let result = build_with_options(&store, &t2, "S1", &options);
        assert!(matches!(result, Err(Error::Cancelled(_))));

        let snap = load_snapshot(&store, "S1").unwrap();
        assert!(snap.contains("a.txt"));
        assert!(!snap.contains("b.txt"));
        assert!(store.try_lock_snapshot("S1").unwrap().is_some());
    }

    #[test]
    fn test_single_worker_matches_many() {
        let (dir, store) = test_store();
        let files: Vec<(String, String)> = (0..40)
            .map(|i| (format!("d{}/f{}.txt", i % 4, i), format!("content {}", i)))
            .collect();
        let borrowed: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
        let root = source_tree(dir.path(), "src", &borrowed);

        let one = BuildOptions {
            workers: Some(1),
            ..Default::default()
        };
        let many = BuildOptions {
            workers: Some(8),
            ..Default::default()
        };
        assert_eq!(build_with_options(&store, &root, "one", &one).unwrap(), 40);
        assert_eq!(build_with_options(&store, &root, "many", &many).unwrap(), 40);

        let a = load_snapshot(&store, "one").unwrap().into_entries();
        let b = load_snapshot(&store, "many").unwrap().into_entries();
        assert_eq!(a, b);
    }

    #[test]
    fn test_concurrent_builds_same_id() {
        let (dir, store) = test_store();
        let t1 = source_tree(dir.path(), "t1", &[("one/a", "1"), ("one/b", "2")]);
        let t2 = source_tree(dir.path(), "t2", &[("two/a", "3"), ("two/b", "4"), ("two/c", "5")]);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| build(&store, &t1, "S").unwrap());
                s.spawn(|| build(&store, &t2, "S").unwrap());
            }
        });

        // whichever build finished last, its snapshot is complete and unmixed
        let snap = load_snapshot(&store, "S").unwrap();
        let paths: Vec<&str> = snap.iter().map(|(p, _)| p).collect();
        assert!(
            paths == vec!["one/a", "one/b"] || paths == vec!["two/a", "two/b", "two/c"],
            "mixed snapshot: {:?}",
            paths
        );
    }

    #[test]
    fn test_readers_see_whole_snapshots_during_rebuild() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (dir, store) = test_store();
        let t1 = source_tree(dir.path(), "t1", &[("one/a", "1"), ("one/b", "2")]);
        let t2 = source_tree(dir.path(), "t2", &[("two/a", "3"), ("two/b", "4"), ("two/c", "5")]);
        let one = vec!["one/a", "one/b"];
        let two = vec!["two/a", "two/b", "two/c"];

        build(&store, &t1, "S").unwrap();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..20 {
                    let root = if i % 2 == 0 { &t2 } else { &t1 };
                    build(&store, root, "S").unwrap();
                }
                done.store(true, Ordering::SeqCst);
            });

            for _ in 0..2 {
                s.spawn(|| {
                    while !done.load(Ordering::SeqCst) {
                        let snap = load_snapshot(&store, "S").unwrap();
                        let paths: Vec<&str> = snap.iter().map(|(p, _)| p).collect();
                        assert!(paths == one || paths == two, "mixed snapshot: {:?}", paths);

                        let result = crate::ops::diff(&store, "S", "S").unwrap();
                        assert!(result.is_empty());
                    }
                });
            }
        });
    }
}
