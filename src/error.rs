use std::path::PathBuf;

/// error type for snapdiff operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("snapshot store not found at {0}")]
    NoStore(PathBuf),

    #[error("snapshot store already exists at {0}")]
    StoreExists(PathBuf),

    #[error("snapshot id missing")]
    EmptySnapshotId,

    #[error("invalid snapshot id: {0}")]
    InvalidSnapshotId(String),

    #[error("root directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("root is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    #[error("invalid entry path: {0}")]
    InvalidEntryPath(String),

    #[error("duplicate entry path: {0}")]
    DuplicateEntryPath(String),

    #[error("path is not valid utf-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("lock held for snapshot {held} cannot write snapshot {requested}")]
    SnapshotMismatch { held: String, requested: String },

    #[error("failed to read {path}: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot not found: {}", .0.join(", "))]
    SnapshotNotFound(Vec<String>),

    #[error("corrupt snapshot {id}: {message}")]
    CorruptSnapshot { id: String, message: String },

    #[error("lock contention on snapshot {0}")]
    LockContention(String),

    #[error("build cancelled for snapshot {0}")]
    Cancelled(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),

    #[error("invalid snapshot pattern: {0}")]
    InvalidPattern(String),

    #[error("failed to start hashing workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// coarse failure classes a caller can act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    ReadFailure,
    NotFound,
    StoreFailure,
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptySnapshotId
            | Error::InvalidSnapshotId(_)
            | Error::RootNotFound(_)
            | Error::RootNotDirectory(_)
            | Error::InvalidEntryPath(_)
            | Error::DuplicateEntryPath(_)
            | Error::NonUtf8Path(_)
            | Error::SnapshotMismatch { .. }
            | Error::InvalidHashHex(_)
            | Error::InvalidPattern(_) => ErrorKind::InvalidArgument,

            Error::ReadFailure { .. } => ErrorKind::ReadFailure,

            Error::SnapshotNotFound(_) => ErrorKind::NotFound,

            Error::Cancelled(_) => ErrorKind::Cancelled,

            Error::NoStore(_)
            | Error::StoreExists(_)
            | Error::CorruptSnapshot { .. }
            | Error::LockContention(_)
            | Error::Io { .. }
            | Error::CborEncode(_)
            | Error::Config(_)
            | Error::ConfigSerialize(_)
            | Error::WorkerPool(_) => ErrorKind::StoreFailure,
        }
    }

    pub(crate) fn not_found(id: impl Into<String>) -> Self {
        Error::SnapshotNotFound(vec![id.into()])
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;

    /// same, but classified as a source read failure rather than a store failure
    fn read_failure(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }

    fn read_failure(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::ReadFailure {
            path: path.into(),
            source,
        })
    }
}
