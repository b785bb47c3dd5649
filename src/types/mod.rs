mod diff;
mod snapshot;

pub use diff::{ChangeKind, DiffDetails, DiffEntry, DiffResult, DiffSummary};
pub use snapshot::{Snapshot, SnapshotEntry};
