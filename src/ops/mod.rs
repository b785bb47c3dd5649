//! high-level operations on snapshot stores

mod build;
mod diff;
mod fsck;
mod gc;
mod ls;

pub use build::{build, build_with_options, BuildOptions};
pub use diff::{diff, diff_snapshots};
pub use fsck::{fsck, CorruptRecord, FsckReport};
pub use gc::{gc, gc_older_than, GcStats, STALE_TMP_AGE};
pub use ls::ls;
