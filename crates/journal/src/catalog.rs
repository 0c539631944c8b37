//! Snapshot catalog
//!
//! The catalog has no index of its own. Every call walks the backup root, so
//! it can never disagree with what is actually on disk.

use crate::Result;
use confsnap_core::{original_path, Error, Manifest, Origin, SnapshotId, COMPLETE_MARKER};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Listing entry for a complete snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub origin: Origin,
    /// Creation time (Unix milliseconds)
    pub created_at_ms: i64,
    /// Live paths covered, derived from the mirrored tree
    pub paths: Vec<PathBuf>,
    /// Bytes on disk, marker included
    pub size_bytes: u64,
}

/// A snapshot directory without a completion marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteSnapshot {
    pub id: SnapshotId,
    pub directory: PathBuf,
    pub size_bytes: u64,
}

/// Read-only view of a backup root
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Complete snapshots, newest first. A missing root is an empty catalog.
    ///
    /// A snapshot whose marker is corrupt or whose tree cannot be walked is
    /// logged and left out; it never hides the others.
    pub fn list(&self) -> Result<Vec<SnapshotSummary>> {
        let mut summaries = Vec::new();

        for (id, dir) in self.snapshot_dirs()? {
            if !has_marker(&dir) {
                tracing::debug!("Skipping {}: no completion marker", dir.display());
                continue;
            }
            let summary = Manifest::read(&dir).and_then(|manifest| summarize(id, &dir, &manifest));
            match summary {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::warn!("Skipping {}: {}", dir.display(), e),
            }
        }

        summaries.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(summaries)
    }

    /// Look up one complete snapshot
    pub fn get(&self, id: &SnapshotId) -> Result<Option<SnapshotSummary>> {
        let dir = self.root.join(id.as_str());
        if !dir.is_dir() {
            return Ok(None);
        }
        match Manifest::read(&dir) {
            Ok(manifest) => Ok(Some(summarize(id.clone(), &dir, &manifest)?)),
            Err(_) => Ok(None),
        }
    }

    /// Directories left behind by aborted captures, oldest first
    ///
    /// Only directories with no `.complete` at all qualify. A marker that
    /// exists but does not parse belongs to a finished capture and is never
    /// offered for collection.
    pub fn incomplete(&self) -> Result<Vec<IncompleteSnapshot>> {
        let mut incomplete = Vec::new();

        for (id, dir) in self.snapshot_dirs()? {
            if has_marker(&dir) {
                continue;
            }
            let size_bytes = dir_size(&dir);
            incomplete.push(IncompleteSnapshot {
                id,
                directory: dir,
                size_bytes,
            });
        }

        incomplete.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(incomplete)
    }

    /// Every directory under the root whose name is a snapshot id
    fn snapshot_dirs(&self) -> Result<Vec<(SnapshotId, PathBuf)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::io(
                    format!("Failed to read backup root {}", self.root.display()),
                    e,
                ))
            }
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io("Failed to read backup root entry", e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(SnapshotId::parse) {
                dirs.push((id, path));
            }
        }

        Ok(dirs)
    }
}

fn summarize(id: SnapshotId, dir: &Path, manifest: &Manifest) -> Result<SnapshotSummary> {
    let mut paths = Vec::new();
    let mut size_bytes = 0;

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry =
            entry.map_err(|e| Error::io(format!("Failed to walk snapshot {}", id), e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        size_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);

        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if entry.depth() == 1 && is_marker_file(relative) {
            continue;
        }
        paths.push(original_path(relative));
    }

    Ok(SnapshotSummary {
        id,
        origin: manifest.origin,
        created_at_ms: manifest.created_at_ms,
        paths,
        size_bytes,
    })
}

/// True when the completion marker exists, whatever its contents
fn has_marker(dir: &Path) -> bool {
    fs::symlink_metadata(dir.join(COMPLETE_MARKER)).is_ok()
}

fn is_marker_file(relative: &Path) -> bool {
    let name = relative.to_string_lossy();
    name == COMPLETE_MARKER || name == format!("{}.tmp", COMPLETE_MARKER)
}

/// Total bytes of regular files below `path`
pub(crate) fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use confsnap_core::{mirror_path, Registry, SnapshotStore, TrackedFile};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_missing_root_is_empty() {
        let catalog = Catalog::new("/nonexistent/confsnap/backups");
        assert!(catalog.list().unwrap().is_empty());
        assert!(catalog.incomplete().unwrap().is_empty());
    }

    #[test]
    fn test_paths_derived_from_tree() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let live = temp.path().join("live");
        fs::create_dir_all(live.join("ssh"))?;
        let fstab = live.join("fstab");
        let sshd = live.join("ssh/sshd_config");
        fs::write(&fstab, b"fstab")?;
        fs::write(&sshd, b"PermitRootLogin no\n")?;

        let registry = Registry::new(vec![TrackedFile::new(&fstab), TrackedFile::new(&sshd)])?;
        let store = SnapshotStore::new(temp.path().join("backups"), registry);
        let snapshot = store.capture_all(Origin::Scheduled)?;

        let catalog = Catalog::new(store.root());
        let summary = catalog.get(&snapshot.id)?.expect("snapshot should be listed");

        assert_eq!(summary.paths, vec![fstab, sshd]);
        assert!(summary.size_bytes > snapshot.total_bytes(), "marker counts toward size");

        Ok(())
    }

    #[test]
    fn test_non_snapshot_entries_ignored() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        fs::create_dir(temp.path().join("lost+found"))?;
        fs::write(temp.path().join("README"), b"backups")?;

        let catalog = Catalog::new(temp.path());
        assert!(catalog.list()?.is_empty());
        assert!(catalog.incomplete()?.is_empty());

        Ok(())
    }

    #[test]
    fn test_corrupt_marker_is_neither_listed_nor_incomplete() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let live = temp.path().join("sysctl.conf");
        fs::write(&live, b"vm.swappiness = 10\n")?;
        let registry = Registry::new(vec![TrackedFile::new(&live)])?;
        let store = SnapshotStore::new(temp.path().join("backups"), registry);
        let damaged = store.capture_all(Origin::Scheduled)?;
        let healthy = store.capture_all(Origin::Scheduled)?;

        let marker = damaged.directory.join(COMPLETE_MARKER);
        let content = fs::read_to_string(&marker)?.replace("scheduled", "manual");
        fs::write(&marker, content)?;

        let catalog = Catalog::new(store.root());
        let listed: Vec<SnapshotId> = catalog.list()?.into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![healthy.id]);
        assert!(catalog.incomplete()?.is_empty());

        Ok(())
    }

    #[test]
    fn test_unwalkable_snapshot_does_not_hide_others() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let live = temp.path().join("fstab");
        fs::write(&live, b"fstab")?;
        let registry = Registry::new(vec![TrackedFile::new(&live)])?;
        let store = SnapshotStore::new(temp.path().join("backups"), registry);
        let first = store.capture_all(Origin::Scheduled)?;
        let second = store.capture_all(Origin::Scheduled)?;

        // An unreadable directory makes the walk of `first` fail
        let mirror_root = first.directory.join(mirror_path(temp.path()));
        let blocked = mirror_root.join("blocked");
        fs::create_dir(&blocked)?;
        fs::set_permissions(&blocked, fs::Permissions::from_mode(0o000))?;

        let result = Catalog::new(store.root()).list();
        fs::set_permissions(&blocked, fs::Permissions::from_mode(0o755))?;

        let listed: Vec<SnapshotId> = result?.into_iter().map(|s| s.id).collect();
        assert!(listed.contains(&second.id));

        Ok(())
    }
}
