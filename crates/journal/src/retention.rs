//! Retention policy and snapshot cleanup

use crate::catalog::Catalog;
use crate::Result;
use confsnap_core::{Error, Manifest, SnapshotId, COMPLETE_MARKER};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Retention policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Number of snapshots to keep (default: 5)
    pub max_snapshots: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { max_snapshots: 5 }
    }
}

/// Outcome of a cleanup run
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Complete snapshots removed by the policy, oldest first
    pub deleted: Vec<SnapshotId>,
    /// Aborted-capture directories removed
    pub incomplete: Vec<SnapshotId>,
    /// Snapshots that could not be removed (`DeletionFailed`)
    pub failed: Vec<Error>,
    /// Failed deletions that lost captured files; no longer listed, and
    /// collected as incomplete by the next run
    pub stranded: Vec<SnapshotId>,
    /// Bytes reclaimed by successful deletions
    pub bytes_freed: u64,
    /// Complete snapshots left after the run
    pub retained: usize,
}

impl CleanupReport {
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.incomplete.is_empty() && self.failed.is_empty()
    }
}

/// Enforces "keep the newest N" over a catalog
pub struct RetentionManager {
    catalog: Catalog,
}

impl RetentionManager {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Delete everything past the newest `max_snapshots`, plus incomplete
    /// directories. Origin plays no part: age alone decides.
    ///
    /// One snapshot failing to delete is recorded and the run continues.
    pub fn cleanup(&self, policy: RetentionPolicy) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        for garbage in self.catalog.incomplete()? {
            match fs::remove_dir_all(&garbage.directory) {
                Ok(()) => {
                    tracing::info!("Removed incomplete snapshot {}", garbage.id);
                    report.bytes_freed += garbage.size_bytes;
                    report.incomplete.push(garbage.id);
                }
                Err(source) => {
                    tracing::warn!("Failed to remove incomplete snapshot {}: {}", garbage.id, source);
                    report.failed.push(Error::DeletionFailed {
                        id: garbage.id.to_string(),
                        source,
                    });
                }
            }
        }

        let catalog = self.catalog.list()?;
        if catalog.len() <= policy.max_snapshots {
            tracing::debug!(
                "{} snapshots within limit of {}, nothing to delete",
                catalog.len(),
                policy.max_snapshots
            );
            report.retained = catalog.len();
            return Ok(report);
        }

        report.retained = policy.max_snapshots;

        // Newest first, so everything past the limit goes, oldest first
        for summary in catalog[policy.max_snapshots..].iter().rev() {
            let dir = self.catalog.root().join(summary.id.as_str());
            let size = summary.size_bytes;

            match delete_snapshot(&dir) {
                Ok(()) => {
                    tracing::info!("Deleted snapshot {} ({} bytes)", summary.id, size);
                    report.bytes_freed += size;
                    report.deleted.push(summary.id.clone());
                }
                Err(failure) => {
                    tracing::warn!("Failed to delete snapshot {}: {}", summary.id, failure.source);
                    match failure.leftover {
                        Leftover::Intact => report.retained += 1,
                        Leftover::Stranded => report.stranded.push(summary.id.clone()),
                    }
                    report.failed.push(Error::DeletionFailed {
                        id: summary.id.to_string(),
                        source: failure.source,
                    });
                }
            }
        }

        Ok(report)
    }
}

/// State of a snapshot whose deletion failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leftover {
    /// Every captured copy survived and the marker is back in place
    Intact,
    /// Some copies are gone; the directory is left without a marker
    Stranded,
}

struct DeletionFailure {
    source: io::Error,
    leftover: Leftover,
}

impl DeletionFailure {
    fn intact(source: io::Error) -> Self {
        Self {
            source,
            leftover: Leftover::Intact,
        }
    }
}

/// Remove a snapshot directory
///
/// The completion marker goes first, so the snapshot leaves the catalog
/// before any content does. If the tree removal then fails with every
/// captured copy still present, the marker is put back and the snapshot is
/// as it was. Otherwise the remains stay unmarked and are collected as
/// incomplete on the next run.
fn delete_snapshot(dir: &Path) -> std::result::Result<(), DeletionFailure> {
    let marker = dir.join(COMPLETE_MARKER);
    let manifest =
        Manifest::read(dir).map_err(|e| DeletionFailure::intact(io::Error::other(e)))?;
    let raw = fs::read(&marker).map_err(DeletionFailure::intact)?;
    fs::remove_file(&marker).map_err(DeletionFailure::intact)?;

    let Err(source) = fs::remove_dir_all(dir) else {
        return Ok(());
    };

    let whole = manifest
        .entries
        .iter()
        .all(|record| dir.join(&record.relative_path).is_file());
    if whole {
        match reinstate_marker(dir, &raw) {
            Ok(()) => return Err(DeletionFailure::intact(source)),
            Err(e) => tracing::warn!("Could not restore marker in {}: {}", dir.display(), e),
        }
    }

    Err(DeletionFailure {
        source,
        leftover: Leftover::Stranded,
    })
}

fn reinstate_marker(dir: &Path, raw: &[u8]) -> io::Result<()> {
    let tmp_path = dir.join(format!("{}.tmp", COMPLETE_MARKER));
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(raw)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, dir.join(COMPLETE_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use confsnap_core::{Origin, Registry, SnapshotStore, TrackedFile};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn store_with_snapshots(count: usize) -> anyhow::Result<(TempDir, SnapshotStore)> {
        let temp = TempDir::new()?;
        let live = temp.path().join("sysctl.conf");
        fs::write(&live, b"kernel.panic = 10\n")?;

        let registry = Registry::new(vec![TrackedFile::new(&live)])?;
        let store = SnapshotStore::new(temp.path().join("backups"), registry);
        for _ in 0..count {
            store.capture_all(Origin::Scheduled)?;
        }

        Ok((temp, store))
    }

    #[test]
    fn test_default_policy() {
        assert_eq!(RetentionPolicy::default().max_snapshots, 5);
    }

    #[test]
    fn test_within_limit_is_noop() -> anyhow::Result<()> {
        let (_temp, store) = store_with_snapshots(3)?;
        let manager = RetentionManager::new(Catalog::new(store.root()));

        let report = manager.cleanup(RetentionPolicy::default())?;

        assert!(report.is_noop());
        assert_eq!(report.bytes_freed, 0);
        assert_eq!(report.retained, 3);

        Ok(())
    }

    #[test]
    fn test_keep_zero_deletes_everything() -> anyhow::Result<()> {
        let (_temp, store) = store_with_snapshots(2)?;
        let catalog = Catalog::new(store.root());
        let manager = RetentionManager::new(catalog.clone());

        let report = manager.cleanup(RetentionPolicy { max_snapshots: 0 })?;

        assert_eq!(report.deleted.len(), 2);
        assert!(report.deleted[0] < report.deleted[1], "oldest deleted first");
        assert!(catalog.list()?.is_empty());
        assert_eq!(fs::read_dir(store.root())?.count(), 0);

        Ok(())
    }

    /// False when running with privileges that ignore directory permissions
    fn permissions_enforced(dir: &Path) -> anyhow::Result<bool> {
        let check_dir = dir.join("read-only-check");
        fs::create_dir(&check_dir)?;
        fs::set_permissions(&check_dir, fs::Permissions::from_mode(0o555))?;
        let enforced = fs::write(check_dir.join("file"), b"").is_err();
        fs::set_permissions(&check_dir, fs::Permissions::from_mode(0o755))?;
        fs::remove_dir_all(&check_dir)?;
        Ok(enforced)
    }

    fn set_mode(path: &Path, mode: u32) -> anyhow::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    #[test]
    fn test_corrupt_marker_survives_cleanup() -> anyhow::Result<()> {
        let (_temp, store) = store_with_snapshots(1)?;
        let catalog = Catalog::new(store.root());
        let dir = fs::read_dir(store.root())?.next().transpose()?.map(|e| e.path());
        let dir = dir.ok_or_else(|| anyhow::anyhow!("snapshot directory missing"))?;

        let marker = dir.join(COMPLETE_MARKER);
        let content = fs::read_to_string(&marker)?.replace("scheduled", "manual");
        fs::write(&marker, content)?;

        let report = RetentionManager::new(catalog).cleanup(RetentionPolicy::default())?;

        assert!(report.is_noop());
        assert!(dir.is_dir());
        assert!(marker.is_file());

        Ok(())
    }

    #[test]
    fn test_failed_deletion_keeps_snapshot_listed() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        if !permissions_enforced(temp.path())? {
            eprintln!("skipping: directory permissions are not enforced for this user");
            return Ok(());
        }

        let live = temp.path().join("live/sub/a.conf");
        fs::create_dir_all(temp.path().join("live/sub"))?;
        fs::write(&live, b"a = 1\n")?;
        let registry = Registry::new(vec![TrackedFile::new(&live)])?;
        let store = SnapshotStore::new(temp.path().join("backups"), registry);
        let snapshot = store.capture_all(Origin::Scheduled)?;

        let copy = snapshot.content_path(&snapshot.entries[0]);
        let blocked = copy.parent().map(Path::to_path_buf).unwrap_or_default();
        set_mode(&blocked, 0o555)?;

        let catalog = Catalog::new(store.root());
        let manager = RetentionManager::new(catalog.clone());
        let result = manager.cleanup(RetentionPolicy { max_snapshots: 0 });
        set_mode(&blocked, 0o755)?;
        let report = result?;

        assert!(report.deleted.is_empty());
        assert!(report.stranded.is_empty());
        assert_eq!(report.retained, 1);
        assert!(matches!(report.failed.as_slice(), [Error::DeletionFailed { .. }]));

        let listed: Vec<SnapshotId> = catalog.list()?.into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![snapshot.id.clone()]);
        assert_eq!(fs::read(&copy)?, b"a = 1\n");
        assert_eq!(store.load(&snapshot.id)?.entries, snapshot.entries);

        Ok(())
    }

    #[test]
    fn test_failed_deletion_with_lost_copy_is_collected_later() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        if !permissions_enforced(temp.path())? {
            eprintln!("skipping: directory permissions are not enforced for this user");
            return Ok(());
        }

        let first = temp.path().join("live/a.conf");
        let second = temp.path().join("live/b/b.conf");
        fs::create_dir_all(temp.path().join("live/b"))?;
        fs::write(&first, b"a\n")?;
        fs::write(&second, b"b\n")?;
        let registry = Registry::new(vec![TrackedFile::new(&first), TrackedFile::new(&second)])?;
        let store = SnapshotStore::new(temp.path().join("backups"), registry);
        let snapshot = store.capture_all(Origin::Scheduled)?;

        let lost = snapshot
            .entries
            .iter()
            .find(|r| r.original_path == first)
            .map(|r| snapshot.content_path(r))
            .unwrap_or_default();
        fs::remove_file(&lost)?;

        let kept = snapshot
            .entries
            .iter()
            .find(|r| r.original_path == second)
            .map(|r| snapshot.content_path(r))
            .unwrap_or_default();
        let blocked = kept.parent().map(Path::to_path_buf).unwrap_or_default();
        set_mode(&blocked, 0o555)?;

        let catalog = Catalog::new(store.root());
        let manager = RetentionManager::new(catalog.clone());
        let result = manager.cleanup(RetentionPolicy { max_snapshots: 0 });
        set_mode(&blocked, 0o755)?;
        let report = result?;

        assert_eq!(report.stranded, vec![snapshot.id.clone()]);
        assert_eq!(report.retained, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(catalog.list()?.is_empty());

        let report = manager.cleanup(RetentionPolicy { max_snapshots: 0 })?;
        assert_eq!(report.incomplete, vec![snapshot.id]);
        assert_eq!(fs::read_dir(store.root())?.count(), 0);

        Ok(())
    }
}
