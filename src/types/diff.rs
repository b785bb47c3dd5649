use serde::{Deserialize, Serialize};

/// diff entry change kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "+"),
            ChangeKind::Deleted => write!(f, "-"),
            ChangeKind::Modified => write!(f, "M"),
        }
    }
}

/// entry in a flattened diff listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: String,
    pub kind: ChangeKind,
}

impl std::fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

/// per-class change counts
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub deleted: usize,
    pub modified: usize,
}

/// changed paths per class, each list sorted by path
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffDetails {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub modified: Vec<String>,
}

/// comparison of two snapshots
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub summary: DiffSummary,
    #[serde(rename = "diff_details")]
    pub details: DiffDetails,
}

impl DiffResult {
    /// build from classified path lists, deriving the summary
    pub fn new(added: Vec<String>, deleted: Vec<String>, modified: Vec<String>) -> Self {
        Self {
            summary: DiffSummary {
                added: added.len(),
                deleted: deleted.len(),
                modified: modified.len(),
            },
            details: DiffDetails {
                added,
                deleted,
                modified,
            },
        }
    }

    /// true when both snapshots hold the same paths with the same hashes
    pub fn is_empty(&self) -> bool {
        self.details.added.is_empty()
            && self.details.deleted.is_empty()
            && self.details.modified.is_empty()
    }

    /// all changes as one list sorted by path
    pub fn changes(&self) -> Vec<DiffEntry> {
        let lists = [
            (&self.details.added, ChangeKind::Added),
            (&self.details.deleted, ChangeKind::Deleted),
            (&self.details.modified, ChangeKind::Modified),
        ];

        let mut changes: Vec<DiffEntry> = lists
            .into_iter()
            .flat_map(|(paths, kind)| {
                paths.iter().map(move |p| DiffEntry {
                    path: p.clone(),
                    kind,
                })
            })
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp(&b.kind)));
        changes
    }
}
