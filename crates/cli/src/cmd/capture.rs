//! Capture tracked files into a new snapshot

use crate::cmd::cleanup_backups;
use crate::interrupt::CriticalSection;
use crate::locks::LockHandle;
use crate::system_config::SystemConfig;
use crate::util;
use anyhow::{Context, Result};
use confsnap_core::Origin;
use confsnap_journal::RetentionManager;
use owo_colors::OwoColorize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Capture `paths`, or the whole registry when `paths` is empty
pub fn run(
    config: &SystemConfig,
    paths: &[PathBuf],
    lock: &LockHandle,
    critical: &CriticalSection,
) -> Result<()> {
    let store = config.store()?;
    tracing::debug!("Capturing under lock held by pid {}", lock.holder_pid());

    let requested: BTreeSet<PathBuf> = if paths.is_empty() {
        store.registry().paths().map(Path::to_path_buf).collect()
    } else {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        paths.iter().map(|p| cwd.join(p)).collect()
    };

    critical.enter();
    let snapshot = store
        .capture(requested.iter().map(PathBuf::as_path), Origin::Scheduled)
        .context("Capture failed")?;

    println!(
        "{} Created snapshot {} ({} files, {})",
        "✓".green(),
        snapshot.id.to_string().yellow(),
        snapshot.entries.len(),
        util::format_size(snapshot.total_bytes())
    );
    for record in &snapshot.entries {
        println!("  {}", record.original_path.display());
    }

    let absent = requested.len().saturating_sub(snapshot.entries.len());
    if absent > 0 {
        println!(
            "{}",
            format!("  {} tracked path(s) absent, nothing to capture", absent).dimmed()
        );
    }

    if config.retention.auto_cleanup {
        let report = RetentionManager::new(config.catalog())
            .cleanup(config.retention.to_retention_policy())
            .context("Automatic cleanup failed")?;
        if !report.is_noop() {
            println!();
            cleanup_backups::print_report(&report);
        }
    }

    Ok(())
}
