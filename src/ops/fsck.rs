use tracing::warn;

use crate::error::{Error, Result};
use crate::snapshots::{load_snapshot, record_files};
use crate::store::Store;

/// fsck report
#[derive(Debug, Default)]
pub struct FsckReport {
    /// snapshot records checked
    pub snapshots_checked: usize,
    /// entries across all readable records
    pub entries_checked: usize,
    /// records that failed verification
    pub corrupt_snapshots: Vec<CorruptRecord>,
}

impl FsckReport {
    pub fn is_ok(&self) -> bool {
        self.corrupt_snapshots.is_empty()
    }
}

#[derive(Debug)]
pub struct CorruptRecord {
    /// snapshot id, or the record file name when it does not decode
    pub name: String,
    pub message: String,
}

/// verify every stored snapshot record
pub fn fsck(store: &Store) -> Result<FsckReport> {
    let mut report = FsckReport::default();

    let mut records = record_files(store)?;
    records.sort_by(|a, b| a.1.cmp(&b.1));

    for (id, path) in records {
        report.snapshots_checked += 1;

        let Some(id) = id else {
            let name = path.display().to_string();
            warn!(record = %name, "record name is not a valid snapshot id");
            report.corrupt_snapshots.push(CorruptRecord {
                name,
                message: "record name is not a valid snapshot id".to_string(),
            });
            continue;
        };

        match load_snapshot(store, &id) {
            Ok(snapshot) => report.entries_checked += snapshot.len(),
            Err(Error::CorruptSnapshot { message, .. }) => {
                warn!(id = %id, %message, "corrupt snapshot record");
                report.corrupt_snapshots.push(CorruptRecord { name: id, message });
            }
            // deleted since the directory was read
            Err(Error::SnapshotNotFound(_)) => report.snapshots_checked -= 1,
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}
