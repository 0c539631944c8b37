//! Restore engine
//!
//! A restore walks `Idle → SnapshotSelected → PreRestoreCaptured → Restoring`
//! and ends in `Completed`, `PartiallyFailed` or `Aborted`. Nothing live is
//! touched until the pre-restore snapshot of the current state is complete,
//! and the selected snapshot is only ever read.

use crate::hooks::{self, ReloadNotifier};
use crate::Result;
use confsnap_core::{Error, FileRecord, Origin, Snapshot, SnapshotId, SnapshotStore};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Restore state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Idle,
    SnapshotSelected,
    PreRestoreCaptured,
    Restoring,
    Completed,
    PartiallyFailed,
    Aborted,
}

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Restored,
    /// Live file already matched the snapshot (content, mode, owner, group)
    Skipped,
    Failed(String),
}

/// What a restore would do to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    Overwrite,
    Unchanged,
}

/// Result of a restore that got past the safety snapshot
#[derive(Debug)]
pub struct RestoreSession {
    pub selected_snapshot: SnapshotId,
    /// Snapshot of the live state taken before anything was overwritten
    pub pre_restore_snapshot: SnapshotId,
    pub per_file_results: BTreeMap<PathBuf, FileOutcome>,
    /// Reload hooks that failed; they do not affect the terminal state
    pub notify_failures: Vec<Error>,
    state: RestoreState,
}

impl RestoreSession {
    /// `Completed` or `PartiallyFailed`
    pub fn state(&self) -> RestoreState {
        self.state
    }

    pub fn restored(&self) -> usize {
        self.count(|o| *o == FileOutcome::Restored)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == FileOutcome::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.per_file_results.values().filter(|o| pred(o)).count()
    }
}

/// Restores snapshots from a store onto the live filesystem
pub struct RestoreEngine<'a, N: ReloadNotifier> {
    store: &'a SnapshotStore,
    notifier: N,
}

impl<'a, N: ReloadNotifier> RestoreEngine<'a, N> {
    pub fn new(store: &'a SnapshotStore, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// Load a snapshot and check it can be restored
    ///
    /// It must be complete, hold at least one file, cover only tracked paths,
    /// and still have every captured copy on disk.
    pub fn select(&self, id: &SnapshotId) -> Result<Snapshot> {
        let snapshot = self.store.load(id)?;

        if snapshot.entries.is_empty() {
            return Err(Error::invalid_snapshot(id.as_str(), "snapshot contains no files"));
        }
        self.store.registry().check(snapshot.original_paths())?;

        if let Some(missing) = snapshot
            .entries
            .iter()
            .find(|record| !snapshot.content_path(record).is_file())
        {
            return Err(Error::invalid_snapshot(
                id.as_str(),
                format!("captured copy of {} is missing", missing.original_path.display()),
            ));
        }

        Ok(snapshot)
    }

    /// Describe what `restore` would do, without writing anything
    pub fn plan(&self, id: &SnapshotId) -> Result<Vec<(FileRecord, PlannedAction)>> {
        let snapshot = self.select(id)?;

        Ok(snapshot
            .entries
            .iter()
            .map(|record| {
                let action = if !record.original_path.exists() {
                    PlannedAction::Create
                } else {
                    match fs::read(snapshot.content_path(record)) {
                        Ok(content) if live_matches(record, &content) => PlannedAction::Unchanged,
                        _ => PlannedAction::Overwrite,
                    }
                };
                (record.clone(), action)
            })
            .collect())
    }

    /// Run a full restore of snapshot `id`
    ///
    /// Returns `Err` when the session aborts (`InvalidSnapshot`,
    /// `UntrackedPath` or `BackupOfCurrentStateFailed`); in that case no live
    /// file has been modified. Per-file failures are recorded in the session.
    pub fn restore(&self, id: &SnapshotId) -> Result<RestoreSession> {
        let mut state = RestoreState::Idle;

        let snapshot = match self.select(id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                advance(&mut state, RestoreState::Aborted, id);
                return Err(e);
            }
        };
        advance(&mut state, RestoreState::SnapshotSelected, id);

        let pre_restore = match self.store.capture(snapshot.original_paths(), Origin::PreRestore) {
            Ok(pre_restore) => pre_restore,
            Err(e) => {
                advance(&mut state, RestoreState::Aborted, id);
                return Err(Error::BackupOfCurrentStateFailed(Box::new(e)));
            }
        };
        advance(&mut state, RestoreState::PreRestoreCaptured, id);

        advance(&mut state, RestoreState::Restoring, id);
        let mut per_file_results = BTreeMap::new();
        for record in &snapshot.entries {
            let outcome = match self.restore_record(&snapshot, record) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("{}", e);
                    FileOutcome::Failed(failure_reason(e))
                }
            };
            per_file_results.insert(record.original_path.clone(), outcome);
        }

        let mut notify_failures = Vec::new();
        for (path, outcome) in &per_file_results {
            if *outcome != FileOutcome::Restored {
                continue;
            }
            if let Some(tracked) = self.store.registry().get(path) {
                if let Err(e) = self.notifier.notify(tracked) {
                    tracing::warn!("{}", e);
                    notify_failures.push(e);
                }
            }
        }

        let any_failed = per_file_results
            .values()
            .any(|o| matches!(o, FileOutcome::Failed(_)));
        let terminal = if any_failed {
            RestoreState::PartiallyFailed
        } else {
            RestoreState::Completed
        };
        advance(&mut state, terminal, id);

        Ok(RestoreSession {
            selected_snapshot: snapshot.id,
            pre_restore_snapshot: pre_restore.id,
            per_file_results,
            notify_failures,
            state,
        })
    }

    /// Replace one live file atomically: stage next to it, apply metadata,
    /// validate, then rename over the original
    fn restore_record(&self, snapshot: &Snapshot, record: &FileRecord) -> Result<FileOutcome> {
        let target = &record.original_path;
        let fail = |reason: String| Error::RestoreFileFailed {
            path: target.clone(),
            reason,
        };

        let content = fs::read(snapshot.content_path(record))
            .map_err(|e| fail(format!("captured copy unreadable: {}", e)))?;

        if live_matches(record, &content) {
            tracing::debug!("{} already matches snapshot {}", target.display(), snapshot.id);
            return Ok(FileOutcome::Skipped);
        }

        let parent = target
            .parent()
            .ok_or_else(|| fail("path has no parent directory".to_string()))?;
        fs::create_dir_all(parent)
            .map_err(|e| fail(format!("cannot create {}: {}", parent.display(), e)))?;

        let mut staged = tempfile::Builder::new()
            .prefix(".confsnap-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| fail(format!("cannot stage file: {}", e)))?;
        staged
            .write_all(&content)
            .map_err(|e| fail(format!("cannot write staged file: {}", e)))?;
        record
            .apply_to(staged.as_file())
            .map_err(|e| fail(format!("cannot apply mode/owner/group: {}", e)))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| fail(format!("cannot sync staged file: {}", e)))?;

        let validate = self
            .store
            .registry()
            .get(target)
            .and_then(|t| t.validate.as_deref());
        if let Some(command) = validate {
            hooks::validate_staged(command, staged.path()).map_err(fail)?;
        }

        staged
            .persist(target)
            .map_err(|e| fail(format!("cannot replace live file: {}", e.error)))?;
        sync_dir(parent);

        tracing::info!("Restored {} from snapshot {}", target.display(), snapshot.id);
        Ok(FileOutcome::Restored)
    }
}

fn advance(state: &mut RestoreState, next: RestoreState, id: &SnapshotId) {
    tracing::debug!("Restore of {}: {:?} -> {:?}", id, state, next);
    *state = next;
}

fn failure_reason(e: Error) -> String {
    match e {
        Error::RestoreFileFailed { reason, .. } => reason,
        other => other.to_string(),
    }
}

/// True when the live file already equals the captured copy, metadata included
fn live_matches(record: &FileRecord, content: &[u8]) -> bool {
    match fs::metadata(&record.original_path) {
        Ok(m) if m.is_file() && m.len() == content.len() as u64 && record.metadata_matches(&m) => {
            fs::read(&record.original_path)
                .map(|live| live == content)
                .unwrap_or(false)
        }
        _ => false,
    }
}

fn sync_dir(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!("Could not sync {}: {}", dir.display(), e);
    }
}
