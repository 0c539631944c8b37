//! Error taxonomy shared by every confsnap crate

use std::io;
use std::path::PathBuf;

/// Errors raised by capture, catalog, retention, restore and locking
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The execution lock is held by a live process
    #[error("another confsnap process is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    /// Capture or restore was requested for a path outside the registry
    #[error("path is not in the tracked-file registry: {}", .0.display())]
    UntrackedPath(PathBuf),

    /// The selected snapshot is missing, incomplete or empty
    #[error("snapshot {id} cannot be used: {reason}")]
    InvalidSnapshot { id: String, reason: String },

    /// I/O failure while writing a snapshot; the partial directory is removed
    #[error("capture failed at {}: {source}", .path.display())]
    CaptureFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The safety snapshot taken before a restore could not be written
    #[error("could not snapshot current state before restoring: {0}")]
    BackupOfCurrentStateFailed(#[source] Box<Error>),

    /// A single file could not be restored
    #[error("failed to restore {}: {reason}", .path.display())]
    RestoreFileFailed { path: PathBuf, reason: String },

    /// Retention could not remove one snapshot directory
    #[error("failed to delete snapshot {id}: {source}")]
    DeletionFailed {
        id: String,
        #[source]
        source: io::Error,
    },

    /// A registry entry is malformed (relative, non-normalized or duplicated)
    #[error("invalid tracked-file registry: {0}")]
    InvalidRegistry(String),

    /// A post-restore reload hook failed
    #[error("reload hook for {} failed: {reason}", .path.display())]
    NotifyFailed { path: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_snapshot(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type used throughout confsnap
pub type Result<T> = std::result::Result<T, Error>;
