//! Capture behavior of the snapshot store

use anyhow::Result;
use confsnap_core::{Error, Origin, Registry, SnapshotStore, TrackedFile, COMPLETE_MARKER};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Live files under `<temp>/live`, snapshots under `<temp>/backups`
fn setup(names: &[&str]) -> Result<(TempDir, SnapshotStore, Vec<PathBuf>)> {
    let temp = TempDir::new()?;
    let live = temp.path().join("live");
    fs::create_dir_all(&live)?;

    let paths: Vec<PathBuf> = names.iter().map(|n| live.join(n)).collect();
    let registry = Registry::new(paths.iter().cloned().map(TrackedFile::new).collect())?;
    let store = SnapshotStore::new(temp.path().join("backups"), registry);

    Ok((temp, store, paths))
}

fn snapshot_dirs(store: &SnapshotStore) -> Result<Vec<PathBuf>> {
    if !store.root().exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(store.root())? {
        dirs.push(entry?.path());
    }
    Ok(dirs)
}

#[test]
fn test_capture_mirrors_content_and_metadata() -> Result<()> {
    let (_temp, store, paths) = setup(&["sysctl.conf"])?;
    fs::write(&paths[0], b"net.ipv4.ip_forward = 1\n")?;
    fs::set_permissions(&paths[0], fs::Permissions::from_mode(0o600))?;

    let snapshot = store.capture_all(Origin::Scheduled)?;

    assert_eq!(snapshot.origin, Origin::Scheduled);
    assert_eq!(snapshot.entries.len(), 1);
    assert!(snapshot.directory.join(COMPLETE_MARKER).exists());

    let record = &snapshot.entries[0];
    assert_eq!(record.original_path, paths[0]);
    assert_eq!(record.mode, 0o600);
    assert_eq!(record.size_bytes, 24);

    let copy = snapshot.content_path(record);
    assert!(copy.starts_with(&snapshot.directory));
    assert_eq!(fs::read(&copy)?, b"net.ipv4.ip_forward = 1\n");
    assert_eq!(fs::metadata(&copy)?.mode() & 0o7777, 0o600);

    Ok(())
}

#[test]
fn test_capture_twice_produces_independent_snapshots() -> Result<()> {
    let (_temp, store, paths) = setup(&["fstab", "sudoers"])?;
    fs::write(&paths[0], b"UUID=abc / ext4 defaults 0 1\n")?;
    fs::write(&paths[1], b"root ALL=(ALL:ALL) ALL\n")?;

    let first = store.capture_all(Origin::Scheduled)?;
    let second = store.capture_all(Origin::Scheduled)?;

    assert_ne!(first.id, second.id);
    assert!(first.id < second.id, "ids must sort in creation order");
    assert_ne!(first.directory, second.directory);

    // Both remain loadable and unchanged
    assert_eq!(store.load(&first.id)?, first);
    assert_eq!(store.load(&second.id)?, second);
    assert_eq!(first.entries, second.entries);

    Ok(())
}

#[test]
fn test_capture_skips_absent_paths() -> Result<()> {
    let (_temp, store, paths) = setup(&["present.conf", "absent.conf"])?;
    fs::write(&paths[0], b"x=1\n")?;

    let snapshot = store.capture_all(Origin::Scheduled)?;

    let captured: Vec<&Path> = snapshot.original_paths().collect();
    assert_eq!(captured, vec![paths[0].as_path()]);

    Ok(())
}

#[test]
fn test_capture_of_nothing_is_still_complete() -> Result<()> {
    let (_temp, store, _paths) = setup(&["absent.conf"])?;

    let snapshot = store.capture_all(Origin::PreRestore)?;

    assert!(snapshot.entries.is_empty());
    assert_eq!(store.load(&snapshot.id)?.origin, Origin::PreRestore);

    Ok(())
}

#[test]
fn test_untracked_path_rejected_without_creating_directory() -> Result<()> {
    let (temp, store, paths) = setup(&["fstab"])?;
    fs::write(&paths[0], b"fstab")?;
    let passwd = temp.path().join("live/passwd");
    fs::write(&passwd, b"root:x:0:0::/root:/bin/bash\n")?;

    let result = store.capture([passwd.as_path(), paths[0].as_path()], Origin::Scheduled);

    match result {
        Err(Error::UntrackedPath(path)) => assert_eq!(path, passwd),
        other => panic!("expected UntrackedPath, got {:?}", other),
    }
    assert!(snapshot_dirs(&store)?.is_empty());

    Ok(())
}

#[test]
fn test_failed_capture_removes_partial_directory() -> Result<()> {
    // "a.conf" is copied first, then "b.conf" (a directory) fails
    let (_temp, store, paths) = setup(&["a.conf", "b.conf"])?;
    fs::write(&paths[0], b"a")?;
    fs::create_dir(&paths[1])?;

    let result = store.capture_all(Origin::Scheduled);

    match result {
        Err(Error::CaptureFailed { path, .. }) => assert_eq!(path, paths[1]),
        other => panic!("expected CaptureFailed, got {:?}", other),
    }
    assert!(snapshot_dirs(&store)?.is_empty(), "partial snapshot left behind");

    Ok(())
}

#[test]
fn test_capture_preserves_ownership_metadata() -> Result<()> {
    let (_temp, store, paths) = setup(&["environment"])?;
    fs::write(&paths[0], b"PATH=/usr/bin\n")?;
    let live = fs::metadata(&paths[0])?;

    let snapshot = store.capture_all(Origin::Scheduled)?;
    let record = &snapshot.entries[0];

    assert_eq!(record.owner, live.uid());
    assert_eq!(record.group, live.gid());

    let copy = fs::metadata(snapshot.content_path(record))?;
    assert_eq!(copy.uid(), live.uid());
    assert_eq!(copy.gid(), live.gid());

    Ok(())
}
