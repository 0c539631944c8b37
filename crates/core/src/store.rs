//! On-disk snapshot store
//!
//! Layout under the backup root:
//! ```text
//! <backup-root>/
//!   20261016-142501/
//!     etc/fstab
//!     etc/sysctl.conf
//!     .complete          <- manifest, written last
//!   20261016-142501-001/ <- same-second capture
//!   20261016-150012/     <- no .complete: aborted capture, never listed
//! ```
//! A snapshot directory is only trusted once `.complete` exists. Everything
//! before that point is scratch space that a failed capture removes and
//! retention garbage-collects.

use crate::error::{Error, Result};
use crate::record::{mirror_path, FileRecord};
use crate::registry::Registry;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Completion marker, relative to a snapshot directory
pub const COMPLETE_MARKER: &str = ".complete";

const ID_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";
const ID_TIME_LEN: usize = 15;
const MAX_SAME_SECOND: u32 = 999;

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Taken by provisioning before it edits a tracked file
    Scheduled,
    /// Safety net taken right before a restore overwrites live files
    PreRestore,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Scheduled => f.write_str("scheduled"),
            Origin::PreRestore => f.write_str("pre-restore"),
        }
    }
}

/// Snapshot identifier: `YYYYMMDD-HHMMSS` in UTC, plus `-NNN` when several
/// snapshots land in the same second. Lexicographic order is creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    fn from_parts(ts: DateTime<Utc>, seq: u32) -> Self {
        let base = ts.format(ID_TIME_FORMAT).to_string();
        if seq == 0 {
            Self(base)
        } else {
            Self(format!("{}-{:03}", base, seq))
        }
    }

    /// Parse a directory name, returning `None` for anything that is not an id
    pub fn parse(s: &str) -> Option<Self> {
        if !s.is_ascii() || s.len() < ID_TIME_LEN {
            return None;
        }
        let (time, suffix) = s.split_at(ID_TIME_LEN);
        NaiveDateTime::parse_from_str(time, ID_TIME_FORMAT).ok()?;

        match suffix {
            "" => Some(Self(s.to_string())),
            _ => {
                let seq = suffix.strip_prefix('-')?;
                if seq.len() == 3 && seq.bytes().all(|b| b.is_ascii_digit()) && seq != "000" {
                    Some(Self(s.to_string()))
                } else {
                    None
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `YYYYMMDD-HHMMSS` part of the id
    fn time_part(&self) -> &str {
        &self.0[..ID_TIME_LEN]
    }

    fn seq(&self) -> u32 {
        self.0
            .get(ID_TIME_LEN + 1..)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::invalid_snapshot(s, "not a snapshot id"))
    }
}

/// Contents of the completion marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub origin: Origin,
    /// Creation time (Unix milliseconds)
    pub created_at_ms: i64,
    /// Metadata of every captured file, in capture order
    pub entries: Vec<FileRecord>,
}

impl Manifest {
    /// Read the completion marker of `dir`
    ///
    /// Fails with `InvalidSnapshot` when the marker is missing or unreadable,
    /// i.e. when the snapshot is not complete.
    pub fn read(dir: &Path) -> Result<Self> {
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let raw = match fs::read(dir.join(COMPLETE_MARKER)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::invalid_snapshot(id, "incomplete (no completion marker)"));
            }
            Err(e) => {
                return Err(Error::invalid_snapshot(id, format!("unreadable marker: {}", e)));
            }
        };

        serde_json::from_slice(&raw)
            .map_err(|e| Error::invalid_snapshot(id, format!("corrupt marker: {}", e)))
    }

    /// Write the marker through a temp file so it appears atomically
    fn write(&self, dir: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;

        let tmp_path = dir.join(format!("{}.tmp", COMPLETE_MARKER));
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, dir.join(COMPLETE_MARKER))?;
        fs::File::open(dir)?.sync_all()
    }
}

/// A complete snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// Root of the mirrored tree
    pub directory: PathBuf,
    pub origin: Origin,
    pub created_at_ms: i64,
    pub entries: Vec<FileRecord>,
}

impl Snapshot {
    pub fn original_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|r| r.original_path.as_path())
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|r| r.size_bytes).sum()
    }

    /// Location of a record's captured copy
    pub fn content_path(&self, record: &FileRecord) -> PathBuf {
        self.directory.join(&record.relative_path)
    }
}

/// Writes and loads snapshots under a backup root
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    registry: Registry,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, registry: Registry) -> Self {
        Self {
            root: root.into(),
            registry,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn snapshot_dir(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Capture every registry path
    pub fn capture_all(&self, origin: Origin) -> Result<Snapshot> {
        let paths: Vec<PathBuf> = self.registry.paths().map(Path::to_path_buf).collect();
        self.capture(paths.iter().map(PathBuf::as_path), origin)
    }

    /// Capture `paths` into a new snapshot
    ///
    /// Every path must be tracked; nothing is written otherwise. Paths that do
    /// not exist are skipped. Any copy failure removes the partial directory.
    pub fn capture<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a Path>,
        origin: Origin,
    ) -> Result<Snapshot> {
        let paths: BTreeSet<&Path> = paths.into_iter().collect();
        self.registry.check(paths.iter().copied())?;

        fs::create_dir_all(&self.root).map_err(|source| Error::CaptureFailed {
            path: self.root.clone(),
            source,
        })?;

        let now = Utc::now();
        let (id, dir) = self.reserve(now)?;
        tracing::debug!("Capturing {} paths into {}", paths.len(), dir.display());

        let mut entries = Vec::new();
        for path in &paths {
            match copy_into(&dir, path) {
                Ok(Some(record)) => entries.push(record),
                Ok(None) => tracing::debug!("{} does not exist, not captured", path.display()),
                Err(source) => {
                    discard(&dir);
                    return Err(Error::CaptureFailed {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }

        let manifest = Manifest {
            origin,
            created_at_ms: now.timestamp_millis(),
            entries,
        };

        if let Err(source) = manifest.write(&dir) {
            discard(&dir);
            return Err(Error::CaptureFailed {
                path: dir.join(COMPLETE_MARKER),
                source,
            });
        }

        tracing::info!(
            "Created {} snapshot {} ({} files)",
            origin,
            id,
            manifest.entries.len()
        );

        Ok(Snapshot {
            id,
            directory: dir,
            origin: manifest.origin,
            created_at_ms: manifest.created_at_ms,
            entries: manifest.entries,
        })
    }

    /// Load a complete snapshot
    pub fn load(&self, id: &SnapshotId) -> Result<Snapshot> {
        let directory = self.snapshot_dir(id);
        if !directory.is_dir() {
            return Err(Error::invalid_snapshot(id.as_str(), "no such snapshot"));
        }

        let manifest = Manifest::read(&directory)?;
        Ok(Snapshot {
            id: id.clone(),
            directory,
            origin: manifest.origin,
            created_at_ms: manifest.created_at_ms,
            entries: manifest.entries,
        })
    }

    /// Create a fresh, uniquely named snapshot directory
    ///
    /// Same-second captures get a sequence suffix one past the highest
    /// existing one, so ids stay in creation order.
    fn reserve(&self, now: DateTime<Utc>) -> Result<(SnapshotId, PathBuf)> {
        let base = SnapshotId::from_parts(now, 0);
        let mut seq = self.next_seq(&base).map_err(|source| Error::CaptureFailed {
            path: self.root.clone(),
            source,
        })?;

        while seq <= MAX_SAME_SECOND {
            let id = SnapshotId::from_parts(now, seq);
            let dir = self.snapshot_dir(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => seq += 1,
                Err(source) => return Err(Error::CaptureFailed { path: dir, source }),
            }
        }

        Err(Error::CaptureFailed {
            path: self.root.clone(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("more than {} snapshots in second {}", MAX_SAME_SECOND, base),
            ),
        })
    }

    fn next_seq(&self, base: &SnapshotId) -> io::Result<u32> {
        let mut next = 0;
        for entry in fs::read_dir(&self.root)? {
            let name = entry?.file_name();
            if let Some(id) = name.to_str().and_then(SnapshotId::parse) {
                if id.time_part() == base.as_str() {
                    next = next.max(id.seq() + 1);
                }
            }
        }
        Ok(next)
    }
}

/// Copy one live file into the mirrored tree, returning `None` if it is absent
fn copy_into(dir: &Path, original: &Path) -> io::Result<Option<FileRecord>> {
    let metadata = match fs::metadata(original) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }

    let dest = dir.join(mirror_path(original));
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let copied = fs::copy(original, &dest)?;
    let mut record = FileRecord::from_metadata(original, &metadata);
    record.size_bytes = copied;

    let file = fs::File::open(&dest)?;
    if let Err(e) = record.apply_to(&file) {
        // Unprivileged captures cannot hand the copy to another owner; the
        // manifest still carries the original ownership for restore.
        if e.kind() != io::ErrorKind::PermissionDenied {
            return Err(e);
        }
        tracing::debug!("Keeping default ownership on copy of {}: {}", original.display(), e);
        file.set_permissions(fs::Permissions::from_mode(record.mode))?;
    }
    file.sync_all()?;

    Ok(Some(record))
}

fn discard(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        tracing::warn!("Failed to remove partial snapshot {}: {}", dir.display(), e);
    }
}
