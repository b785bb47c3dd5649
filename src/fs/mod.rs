//! filesystem traversal for snapshot builds

mod walk;

pub use walk::{collect_files, validate_root, SourceFile, SymlinkPolicy};
