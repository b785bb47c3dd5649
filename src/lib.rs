//! snapdiff - content-addressed directory snapshots
//!
//! captures a directory tree as a mapping from relative path to the SHA-256
//! of each file's bytes, stores it under a caller-chosen id, and compares two
//! stored snapshots path by path.
//!
//! # Core concepts
//!
//! - **Snapshot**: the complete path -> hash inventory of one tree, keyed by id
//! - **Store**: a directory holding one record per snapshot id, replaced atomically
//! - **Diff**: every path of two snapshots classified as added, deleted or modified
//!
//! building under an existing id replaces the previous snapshot as a whole.
//! builds on the same id are serialized by a per-id lock; readers only ever
//! see a complete snapshot.
//!
//! # Example usage
//!
//! ```no_run
//! use snapdiff::{ops, Store};
//! use std::path::Path;
//!
//! let store = Store::init(Path::new("/path/to/store")).unwrap();
//!
//! let count = ops::build(&store, Path::new("/tree/v1"), "v1").unwrap();
//! println!("recorded {} files", count);
//! ops::build(&store, Path::new("/tree/v2"), "v2").unwrap();
//!
//! let result = ops::diff(&store, "v1", "v2").unwrap();
//! for change in result.changes() {
//!     println!("{}", change);
//! }
//! ```

mod config;
mod error;
mod hash;
mod snapshots;
mod store;

pub mod fs;
pub mod ops;
pub mod types;

pub use config::{BuildConfig, Config, StorageConfig};
pub use error::{Error, ErrorKind, Result};
pub use hash::{hash_file, hash_reader, ContentHasher, Hash, HASH_CHUNK_SIZE};
pub use snapshots::{
    delete_snapshot, list_snapshots, list_snapshots_matching, load_snapshot, replace_snapshot,
    replace_snapshot_locked, snapshot_exists,
};
pub use store::{validate_snapshot_id, SnapshotLock, Store, MAX_SNAPSHOT_ID_LEN};
pub use types::{ChangeKind, DiffDetails, DiffEntry, DiffResult, DiffSummary, Snapshot, SnapshotEntry};
