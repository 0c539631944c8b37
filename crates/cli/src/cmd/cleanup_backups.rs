//! Apply the retention policy

use crate::interrupt::CriticalSection;
use crate::locks::LockHandle;
use crate::system_config::SystemConfig;
use crate::util;
use anyhow::{Context, Result};
use confsnap_journal::{CleanupReport, RetentionManager, RetentionPolicy};
use owo_colors::OwoColorize;
use std::process::ExitCode;

/// Keep the newest `max_snapshots` (config default when `None`)
///
/// Exits non-zero when any snapshot could not be deleted.
pub fn run(
    config: &SystemConfig,
    max_snapshots: Option<usize>,
    _lock: &LockHandle,
    critical: &CriticalSection,
) -> Result<ExitCode> {
    let policy = match max_snapshots {
        Some(max_snapshots) => RetentionPolicy { max_snapshots },
        None => config.retention.to_retention_policy(),
    };

    println!(
        "{}",
        format!("Keeping the newest {} backups...", policy.max_snapshots).bold()
    );
    println!();

    critical.enter();
    let report = RetentionManager::new(config.catalog())
        .cleanup(policy)
        .context("Cleanup failed")?;

    print_report(&report);

    if report.failed.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

pub fn print_report(report: &CleanupReport) {
    if report.is_noop() {
        println!(
            "{}",
            format!("Nothing to delete - {} backups retained", report.retained).dimmed()
        );
        return;
    }

    for id in &report.deleted {
        println!("{} Deleted {}", "✓".green(), id.to_string().yellow());
    }
    for id in &report.incomplete {
        println!("{} Removed incomplete {}", "✓".green(), id.to_string().yellow());
    }
    for error in &report.failed {
        println!("{} {}", "✗".red(), error.to_string().red());
    }
    for id in &report.stranded {
        println!(
            "{}",
            format!("  {} lost files and will be removed by the next cleanup", id).dimmed()
        );
    }

    println!();
    println!("Backups deleted: {}", report.deleted.len().to_string().yellow());
    if !report.incomplete.is_empty() {
        println!("Incomplete removed: {}", report.incomplete.len().to_string().yellow());
    }
    println!("Backups retained: {}", report.retained);
    println!("Space freed:     {}", util::format_size(report.bytes_freed).green());
}
