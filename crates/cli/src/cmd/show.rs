//! Show one snapshot's records

use crate::system_config::SystemConfig;
use crate::util;
use anyhow::{Context, Result};
use confsnap_core::SnapshotId;
use owo_colors::OwoColorize;

pub fn run(config: &SystemConfig, id: &str) -> Result<()> {
    let id: SnapshotId = id.parse()?;
    let store = config.store()?;
    let snapshot = store.load(&id).context("Failed to load snapshot")?;

    println!("{} {}", "Snapshot".bold(), snapshot.id.to_string().yellow());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Origin:    {}", snapshot.origin);
    println!(
        "Created:   {} {}",
        util::format_absolute_time(snapshot.created_at_ms),
        format!("({})", util::format_relative_time(snapshot.created_at_ms)).dimmed()
    );
    println!("Directory: {}", snapshot.directory.display());
    println!(
        "Files:     {} ({})",
        snapshot.entries.len(),
        util::format_size(snapshot.total_bytes())
    );
    println!();

    if snapshot.entries.is_empty() {
        println!("{}", "No tracked file existed when this snapshot was taken".dimmed());
        return Ok(());
    }

    for record in &snapshot.entries {
        println!(
            "  {}  {:<16}  {:>9}  {}",
            util::format_mode(record.mode),
            util::format_owner(record.owner, record.group),
            util::format_size(record.size_bytes),
            record.original_path.display()
        );
    }

    Ok(())
}
