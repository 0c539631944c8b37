//! Interactive restore from a snapshot

use crate::cmd::list_backups;
use crate::interrupt::CriticalSection;
use crate::locks::LockHandle;
use crate::system_config::SystemConfig;
use crate::util;
use anyhow::{Context, Result};
use confsnap_core::{Error, SnapshotId};
use confsnap_journal::{
    CommandNotifier, FileOutcome, PlannedAction, RestoreEngine, RestoreSession, RestoreState,
};
use owo_colors::OwoColorize;
use std::io::{self, BufRead};
use std::process::ExitCode;

/// Exit status for an aborted or cancelled restore
pub const EXIT_ABORTED: u8 = 1;

/// Exit status when at least one file failed to restore
pub const EXIT_PARTIAL: u8 = 2;

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Snapshot id; prompt with a numbered menu when `None`
    pub snapshot: Option<String>,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Show the plan and stop
    pub dry_run: bool,
}

pub fn run(
    config: &SystemConfig,
    options: &RestoreOptions,
    lock: &LockHandle,
    critical: &CriticalSection,
) -> Result<ExitCode> {
    let stdin = io::stdin();
    run_with_input(config, options, lock, critical, &mut stdin.lock())
}

/// Restore with answers read from `input`
pub fn run_with_input(
    config: &SystemConfig,
    options: &RestoreOptions,
    _lock: &LockHandle,
    critical: &CriticalSection,
    input: &mut impl BufRead,
) -> Result<ExitCode> {
    let store = config.store()?;

    // 1. Pick the snapshot
    let id = match &options.snapshot {
        Some(reference) => reference.parse::<SnapshotId>()?,
        None => match choose_snapshot(config, input)? {
            Some(id) => id,
            None => return Ok(ExitCode::from(EXIT_ABORTED)),
        },
    };

    let engine = RestoreEngine::new(&store, CommandNotifier);
    let snapshot = match engine.select(&id) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            print_aborted(&e);
            return Ok(ExitCode::from(EXIT_ABORTED));
        }
    };
    let plan = engine.plan(&id).context("Failed to plan restore")?;

    // 2. Show what will happen and confirm
    println!();
    println!("{}", "Restore Backup".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!(
        "Snapshot: {} {}",
        snapshot.id.to_string().yellow(),
        util::format_relative_time(snapshot.created_at_ms).dimmed()
    );
    println!("Origin:   {}", snapshot.origin);
    println!("Files:    {}", snapshot.entries.len());
    println!();

    for (record, action) in &plan {
        let label = match action {
            PlannedAction::Create => "create   ".green().to_string(),
            PlannedAction::Overwrite => "overwrite".yellow().to_string(),
            PlannedAction::Unchanged => "unchanged".dimmed().to_string(),
        };
        println!("  {}  {}", label, record.original_path.display());
    }
    println!();

    if options.dry_run {
        println!("{}", "Dry run - no files were changed".dimmed());
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{}",
        "⚠️  Warning: This will overwrite live system files!".red().bold()
    );
    println!(
        "{}",
        "   The current state is captured first so the restore can be undone.".dimmed()
    );
    println!();

    if !options.yes && !util::confirm(input, "Continue?")? {
        println!("{}", "Restore cancelled".yellow());
        return Ok(ExitCode::from(EXIT_ABORTED));
    }

    // 3. Restore
    println!();
    critical.enter();
    match engine.restore(&id) {
        Ok(session) => {
            print_session(&session);
            Ok(exit_code(&session))
        }
        Err(e) => {
            print_aborted(&e);
            Ok(ExitCode::from(EXIT_ABORTED))
        }
    }
}

fn choose_snapshot(config: &SystemConfig, input: &mut impl BufRead) -> Result<Option<SnapshotId>> {
    let summaries = config
        .catalog()
        .list()
        .context("Failed to read snapshot catalog")?;

    if summaries.is_empty() {
        println!("{}", "No backups found - nothing to restore".yellow());
        return Ok(None);
    }

    println!("{}", "Available backups".bold());
    println!();
    for (i, summary) in summaries.iter().enumerate() {
        list_backups::print_summary(i + 1, summary);
    }
    println!();

    let answer = util::prompt(input, &format!("Select a backup [1-{}]: ", summaries.len()))?;
    match util::parse_selection(&answer, summaries.len()) {
        Some(index) => Ok(Some(summaries[index].id.clone())),
        None => {
            println!("{}", format!("Invalid selection: '{}'", answer).red());
            Ok(None)
        }
    }
}

fn print_session(session: &RestoreSession) {
    for (path, outcome) in &session.per_file_results {
        match outcome {
            FileOutcome::Restored => println!("{} restored  {}", "✓".green(), path.display()),
            FileOutcome::Skipped => println!(
                "{} {}",
                "-".dimmed(),
                format!("unchanged {}", path.display()).dimmed()
            ),
            FileOutcome::Failed(reason) => println!(
                "{} failed    {}: {}",
                "✗".red(),
                path.display(),
                reason.red()
            ),
        }
    }

    for failure in &session.notify_failures {
        println!("{} {}", "⚠".yellow(), failure.to_string().yellow());
    }

    println!();
    match session.state() {
        RestoreState::Completed => println!("{}", "Restore completed".green().bold()),
        _ => println!("{}", "Restore partially failed".red().bold()),
    }
    println!(
        "Restored: {}  Unchanged: {}  Failed: {}",
        session.restored(),
        session.skipped(),
        session.failed()
    );
    println!();
    println!(
        "Pre-restore snapshot: {}",
        session.pre_restore_snapshot.to_string().yellow()
    );
    println!(
        "{}",
        format!(
            "Undo with: confsnap restore --snapshot {}",
            session.pre_restore_snapshot
        )
        .dimmed()
    );
}

fn print_aborted(error: &Error) {
    println!("{} {}", "Restore aborted:".red().bold(), error);
    println!("{}", "No live file was modified.".dimmed());
}

fn exit_code(session: &RestoreSession) -> ExitCode {
    match session.state() {
        RestoreState::Completed => ExitCode::SUCCESS,
        _ => ExitCode::from(EXIT_PARTIAL),
    }
}
