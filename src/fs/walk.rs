use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// a regular file found under a snapshot root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// `/`-separated path relative to the root
    pub rel_path: String,
    /// path to open for reading
    pub abs_path: PathBuf,
}

/// symlink handling while walking a root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymlinkPolicy {
    /// symlinks are neither followed nor recorded
    #[default]
    Skip,
    /// symlinks are followed; loops and dangling links are read failures
    Follow,
}

/// check that a snapshot root exists and is a directory
pub fn validate_root(root: &Path) -> Result<()> {
    let meta = std::fs::metadata(root).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::RootNotFound(root.to_path_buf())
        } else {
            Error::ReadFailure {
                path: root.to_path_buf(),
                source: e,
            }
        }
    })?;

    if !meta.is_dir() {
        return Err(Error::RootNotDirectory(root.to_path_buf()));
    }

    Ok(())
}

/// collect every regular file under root, sorted by relative path
///
/// FIFOs, sockets and device nodes are skipped.
pub fn collect_files(root: &Path, policy: SymlinkPolicy) -> Result<Vec<SourceFile>> {
    validate_root(root)?;

    let walker = WalkDir::new(root)
        .follow_links(policy == SymlinkPolicy::Follow)
        .sort_by_file_name();

    let mut files = Vec::new();

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            Error::ReadFailure {
                path,
                source: e.into(),
            }
        })?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        if file_type.is_symlink() {
            debug!(path = %entry.path().display(), "skipping symlink");
            continue;
        }

        if !file_type.is_file() {
            debug!(path = %entry.path().display(), "skipping special file");
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::InvalidEntryPath(entry.path().display().to_string()))?;

        files.push(SourceFile {
            rel_path: to_posix_path(rel)?,
            abs_path: entry.path().to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// join the normal components of a relative path with `/`
fn to_posix_path(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();

    for component in rel.components() {
        match component {
            Component::Normal(name) => {
                let name = name
                    .to_str()
                    .ok_or_else(|| Error::NonUtf8Path(rel.to_path_buf()))?;
                parts.push(name);
            }
            Component::CurDir => {}
            _ => return Err(Error::InvalidEntryPath(rel.display().to_string())),
        }
    }

    Ok(parts.join("/"))
}
