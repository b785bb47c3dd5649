//! snapshot record persistence
//!
//! one record file per snapshot id, replaced as a whole by rename.
//! record layout: SHA-256(payload) | payload, payload = zstd(CBOR(record)).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::Hash;
use crate::store::{decode_id, validate_snapshot_id, SnapshotLock, Store};
use crate::types::Snapshot;

/// current record format
const FORMAT_VERSION: u32 = 1;

const CHECKSUM_LEN: usize = 32;

const RECORD_EXTENSION: &str = "snap";

#[derive(Serialize)]
struct RecordRef<'a> {
    format: u32,
    id: &'a str,
    entries: &'a BTreeMap<String, Hash>,
}

#[derive(Deserialize)]
struct Record {
    format: u32,
    id: String,
    entries: BTreeMap<String, Hash>,
}

/// replace the stored snapshot for `snapshot.id()` with `snapshot`
///
/// takes the id's lock for the duration of the write.
pub fn replace_snapshot(store: &Store, snapshot: &Snapshot) -> Result<()> {
    let lock = store.lock_snapshot(snapshot.id())?;
    replace_snapshot_locked(store, &lock, snapshot)
}

/// replace a snapshot while the caller already holds its lock
///
/// readers observe either the previous record or the new one, never a mix.
/// on failure the previous record is left in place. once the rename lands the
/// replace has succeeded; a failed directory fsync after it is only logged.
pub fn replace_snapshot_locked(
    store: &Store,
    lock: &SnapshotLock,
    snapshot: &Snapshot,
) -> Result<()> {
    if lock.id() != snapshot.id() {
        return Err(Error::SnapshotMismatch {
            held: lock.id().to_string(),
            requested: snapshot.id().to_string(),
        });
    }

    let bytes = encode_record(snapshot, store.config().storage.compression_level)?;
    let path = store.snapshot_path(snapshot.id());
    write_atomic(store, &path, &bytes)?;

    debug!(
        id = snapshot.id(),
        entries = snapshot.len(),
        bytes = bytes.len(),
        "replaced snapshot record"
    );
    Ok(())
}

/// load a snapshot by id
///
/// a never-built id is `SnapshotNotFound`; a built but empty snapshot loads with no entries.
pub fn load_snapshot(store: &Store, id: &str) -> Result<Snapshot> {
    validate_snapshot_id(id)?;
    let path = store.snapshot_path(id);

    let bytes = fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(id)
        } else {
            Error::Io {
                path: path.clone(),
                source: e,
            }
        }
    })?;

    decode_record(id, &bytes)
}

/// check if a snapshot has been built under this id
pub fn snapshot_exists(store: &Store, id: &str) -> bool {
    validate_snapshot_id(id).is_ok() && store.snapshot_path(id).is_file()
}

/// delete a snapshot record
pub fn delete_snapshot(store: &Store, id: &str) -> Result<()> {
    let _lock = store.lock_snapshot(id)?;
    let path = store.snapshot_path(id);

    fs::remove_file(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(id)
        } else {
            Error::Io {
                path: path.clone(),
                source: e,
            }
        }
    })?;

    sync_dir(&store.snapshots_path());
    Ok(())
}

/// list all snapshot ids, sorted
pub fn list_snapshots(store: &Store) -> Result<Vec<String>> {
    let mut ids: Vec<String> = record_files(store)?
        .into_iter()
        .filter_map(|(id, path)| {
            if id.is_none() {
                warn!(path = %path.display(), "ignoring record with undecodable name");
            }
            id
        })
        .collect();

    ids.sort();
    Ok(ids)
}

/// list snapshot ids matching a glob pattern
pub fn list_snapshots_matching(store: &Store, pattern: &str) -> Result<Vec<String>> {
    let all = list_snapshots(store)?;
    let glob = glob::Pattern::new(pattern).map_err(|e| Error::InvalidPattern(e.to_string()))?;

    Ok(all.into_iter().filter(|id| glob.matches(id)).collect())
}

/// every record file with its decoded id
///
/// None if the name does not decode to a valid snapshot id.
pub(crate) fn record_files(store: &Store) -> Result<Vec<(Option<String>, PathBuf)>> {
    let dir = store.snapshots_path();
    let mut records = Vec::new();

    for entry in fs::read_dir(&dir).with_path(&dir)? {
        let entry = entry.with_path(&dir)?;
        let path = entry.path();

        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
            continue;
        }

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(decode_id)
            .filter(|id| validate_snapshot_id(id).is_ok());
        records.push((id, path));
    }

    Ok(records)
}

/// serialize a snapshot into its on-disk form
fn encode_record(snapshot: &Snapshot, level: i32) -> Result<Vec<u8>> {
    let record = RecordRef {
        format: FORMAT_VERSION,
        id: snapshot.id(),
        entries: snapshot.entries(),
    };

    let mut cbor_bytes = Vec::new();
    ciborium::into_writer(&record, &mut cbor_bytes)?;

    let payload = zstd::encode_all(&cbor_bytes[..], level).map_err(|e| Error::Io {
        path: PathBuf::from("<zstd>"),
        source: e,
    })?;

    let mut bytes = Vec::with_capacity(CHECKSUM_LEN + payload.len());
    bytes.extend_from_slice(Hash::of_bytes(&payload).as_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// parse and verify a record expected to hold snapshot `id`
fn decode_record(id: &str, bytes: &[u8]) -> Result<Snapshot> {
    let corrupt = |message: String| Error::CorruptSnapshot {
        id: id.to_string(),
        message,
    };

    if bytes.len() < CHECKSUM_LEN {
        return Err(corrupt(format!("truncated record ({} bytes)", bytes.len())));
    }

    let (checksum, payload) = bytes.split_at(CHECKSUM_LEN);
    if Hash::of_bytes(payload).as_bytes()[..] != checksum[..] {
        return Err(corrupt("checksum mismatch".to_string()));
    }

    let cbor_bytes =
        zstd::decode_all(payload).map_err(|e| corrupt(format!("decompression failed: {}", e)))?;
    let record: Record = ciborium::from_reader(&cbor_bytes[..])
        .map_err(|e| corrupt(format!("decode failed: {}", e)))?;

    if record.format != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported record format {}", record.format)));
    }

    if record.id != id {
        return Err(corrupt(format!("record belongs to snapshot {}", record.id)));
    }

    Snapshot::from_map(record.id, record.entries).map_err(|e| corrupt(e.to_string()))
}

/// atomic write: temp -> fsync -> rename -> fsync parent (best effort)
fn write_atomic(store: &Store, path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = store.tmp_path().join(uuid::Uuid::new_v4().to_string());

    let written = (|| {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        tmp_file.write_all(bytes).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
        fs::rename(&tmp_path, path).with_path(path)
    })();

    if let Err(e) = written {
        // previous record untouched; drop the partial temp file
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Some(parent) = path.parent() {
        sync_dir(parent);
    }

    Ok(())
}

/// fsync a directory after a rename or unlink has already landed
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|f| f.sync_all()) {
        warn!(dir = %dir.display(), error = %e, "directory fsync failed");
    }
}
