use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};

/// longest accepted snapshot id, in bytes
///
/// ids are hex-encoded into file names, which must fit in NAME_MAX.
pub const MAX_SNAPSHOT_ID_LEN: usize = 120;

/// a snapshot store rooted at a directory
pub struct Store {
    path: PathBuf,
    config: Config,
}

impl Store {
    /// initialize a new store at the given path
    pub fn init(path: &Path) -> Result<Self> {
        Self::init_with_config(path, Config::default())
    }

    /// initialize a new store with explicit configuration
    pub fn init_with_config(path: &Path, config: Config) -> Result<Self> {
        let config_path = path.join("config.toml");
        if config_path.exists() {
            return Err(Error::StoreExists(path.to_path_buf()));
        }

        std::fs::create_dir_all(path.join("snapshots")).with_path(path)?;
        std::fs::create_dir_all(path.join("locks")).with_path(path)?;
        std::fs::create_dir_all(path.join("tmp")).with_path(path)?;

        config.save(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// open an existing store
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if !config_path.exists() {
            return Err(Error::NoStore(path.to_path_buf()));
        }

        let config = Config::load(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// store root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// store configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// save configuration changes
    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.config_path())
    }

    /// path to config.toml
    pub fn config_path(&self) -> PathBuf {
        self.path.join("config.toml")
    }

    /// path to snapshot records
    pub fn snapshots_path(&self) -> PathBuf {
        self.path.join("snapshots")
    }

    /// path to per-snapshot lock files
    pub fn locks_path(&self) -> PathBuf {
        self.path.join("locks")
    }

    /// path to tmp directory (for atomic writes)
    pub fn tmp_path(&self) -> PathBuf {
        self.path.join("tmp")
    }

    /// path of the record file for a snapshot id
    pub fn snapshot_path(&self, id: &str) -> PathBuf {
        self.snapshots_path().join(format!("{}.snap", encode_id(id)))
    }

    /// path of the lock file for a snapshot id
    pub fn lock_path(&self, id: &str) -> PathBuf {
        self.locks_path().join(format!("{}.lock", encode_id(id)))
    }

    /// acquire the exclusive lock for one snapshot id, waiting if held
    ///
    /// locks on different ids never contend.
    pub fn lock_snapshot(&self, id: &str) -> Result<SnapshotLock> {
        self.acquire(id, true)?
            .ok_or_else(|| Error::LockContention(id.to_string()))
    }

    /// try to acquire the lock for one snapshot id, returning None if already held
    pub fn try_lock_snapshot(&self, id: &str) -> Result<Option<SnapshotLock>> {
        self.acquire(id, false)
    }

    fn acquire(&self, id: &str, blocking: bool) -> Result<Option<SnapshotLock>> {
        validate_snapshot_id(id)?;
        let lock_path = self.lock_path(id);

        loop {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .with_path(&lock_path)?;

            let arg = if blocking {
                FlockArg::LockExclusive
            } else {
                FlockArg::LockExclusiveNonblock
            };

            let flock = match Flock::lock(file, arg) {
                Ok(flock) => flock,
                Err((_, nix::errno::Errno::EWOULDBLOCK)) => return Ok(None),
                Err(_) => return Err(Error::LockContention(id.to_string())),
            };

            // gc may unlink an idle lock file between our open and flock
            if is_same_file(&flock, &lock_path)? {
                return Ok(Some(SnapshotLock {
                    id: id.to_string(),
                    path: lock_path,
                    flock,
                }));
            }
        }
    }
}

/// guard that holds one snapshot id's lock until dropped
pub struct SnapshotLock {
    id: String,
    path: PathBuf,
    #[allow(dead_code)]
    flock: Flock<File>,
}
// lock is released automatically when Flock is dropped

impl SnapshotLock {
    /// the snapshot id this guard serializes
    pub fn id(&self) -> &str {
        &self.id
    }

    /// unlink the lock file while still holding it, then release
    pub(crate) fn remove(self) -> Result<()> {
        fs::remove_file(&self.path).with_path(&self.path)
    }
}

/// does the open file still back `path`
fn is_same_file(file: &File, path: &Path) -> Result<bool> {
    let held = file.metadata().with_path(path)?;

    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// check that a snapshot id is usable as a store key
pub fn validate_snapshot_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::EmptySnapshotId);
    }

    if id.len() > MAX_SNAPSHOT_ID_LEN {
        return Err(Error::InvalidSnapshotId(format!(
            "id longer than {} bytes",
            MAX_SNAPSHOT_ID_LEN
        )));
    }

    if id.contains('\0') {
        return Err(Error::InvalidSnapshotId(format!(
            "id cannot contain null byte: {}",
            id.escape_default()
        )));
    }

    Ok(())
}

/// encode an opaque id into a file-name-safe stem
pub(crate) fn encode_id(id: &str) -> String {
    hex::encode(id.as_bytes())
}

/// inverse of encode_id, None for names not produced by it
pub(crate) fn decode_id(stem: &str) -> Option<String> {
    let bytes = hex::decode(stem).ok()?;
    String::from_utf8(bytes).ok()
}
