//! List snapshots newest-first

use crate::system_config::SystemConfig;
use crate::util;
use anyhow::{Context, Result};
use confsnap_core::Origin;
use confsnap_journal::SnapshotSummary;
use owo_colors::OwoColorize;

pub fn run(config: &SystemConfig) -> Result<()> {
    let summaries = config
        .catalog()
        .list()
        .context("Failed to read snapshot catalog")?;

    if summaries.is_empty() {
        println!("{}", "No backups found".dimmed());
        println!();
        println!(
            "{}",
            format!("Backup root: {}", config.paths.backup_root.display()).dimmed()
        );
        return Ok(());
    }

    println!("{} ({})", "Backups".bold(), summaries.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    for (i, summary) in summaries.iter().enumerate() {
        print_summary(i + 1, summary);
    }

    Ok(())
}

/// One numbered catalog entry, shared with the restore menu
pub fn print_summary(index: usize, summary: &SnapshotSummary) {
    let origin = match summary.origin {
        Origin::Scheduled => summary.origin.to_string().cyan().to_string(),
        Origin::PreRestore => summary.origin.to_string().magenta().to_string(),
    };

    println!(
        "{:>3}. {}  {:<11}  {} files  {:>9}  {} {}",
        index,
        summary.id.to_string().yellow(),
        origin,
        summary.paths.len(),
        util::format_size(summary.size_bytes),
        util::format_absolute_time(summary.created_at_ms),
        format!("({})", util::format_relative_time(summary.created_at_ms)).dimmed()
    );
    for path in &summary.paths {
        println!("       {}", path.display().dimmed());
    }
}
