//! confsnap CLI - snapshot and restore tracked configuration files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use confsnap::cmd;
use confsnap::cmd::restore::RestoreOptions;
use confsnap::interrupt::CriticalSection;
use confsnap::locks::LockHandle;
use confsnap::system_config::{self, SystemConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

/// confsnap - point-in-time snapshots of host configuration files
#[derive(Parser)]
#[command(name = "confsnap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "CONFSNAP_CONFIG")]
    config: Option<PathBuf>,

    /// Take over the execution lock even if another confsnap is running
    #[arg(long, global = true)]
    force: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture tracked files into a new snapshot
    Capture {
        /// Paths to capture (default: every tracked file)
        paths: Vec<PathBuf>,
    },
    /// List snapshots, newest first
    ListBackups,
    /// Show the files recorded in a snapshot
    Show {
        /// Snapshot ID
        id: String,
    },
    /// Restore tracked files from a snapshot
    Restore {
        /// Snapshot ID (default: choose from a list)
        #[arg(long)]
        snapshot: Option<String>,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete all but the newest snapshots
    CleanupBackups {
        /// Number of snapshots to keep (default: retention.max_snapshots)
        max_snapshots: Option<usize>,
    },
    /// List tracked files and their hooks
    Tracked,
    /// Print the effective configuration
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = system_config::load(cli.config.as_deref())?;
    let force = cli.force;

    match cli.command {
        Commands::Capture { paths } => {
            run_locked(config, force, move |config, lock, critical| {
                cmd::capture::run(config, &paths, lock, critical)?;
                Ok(ExitCode::SUCCESS)
            })
            .await
        }
        Commands::ListBackups => {
            cmd::list_backups::run(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { id } => {
            cmd::show::run(&config, &id)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Restore {
            snapshot,
            yes,
            dry_run,
        } => {
            let options = RestoreOptions {
                snapshot,
                yes,
                dry_run,
            };
            run_locked(config, force, move |config, lock, critical| {
                cmd::restore::run(config, &options, lock, critical)
            })
            .await
        }
        Commands::CleanupBackups { max_snapshots } => {
            run_locked(config, force, move |config, lock, critical| {
                cmd::cleanup_backups::run(config, max_snapshots, lock, critical)
            })
            .await
        }
        Commands::Tracked => {
            cmd::tracked::run(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            cmd::config::run(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run a mutating command under the execution lock
///
/// The command runs on the blocking pool while this task waits for SIGINT or
/// SIGTERM. Until the command enters its critical section a signal exits at
/// once. After that the signal is remembered, the command runs to its
/// terminal state, and the process then exits with the signal's status.
/// Both paths end in `process::exit`, so the lock file is removed here rather
/// than by the handle's destructor.
async fn run_locked<F>(config: SystemConfig, force: bool, op: F) -> Result<ExitCode>
where
    F: FnOnce(&SystemConfig, &LockHandle, &CriticalSection) -> Result<ExitCode> + Send + 'static,
{
    let lock = Arc::new(
        LockHandle::acquire(&config.paths.lock_file, force)
            .context("Failed to acquire execution lock")?,
    );
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    let critical = CriticalSection::new();
    let task_critical = critical.clone();
    let task_lock = Arc::clone(&lock);
    let mut task = tokio::task::spawn_blocking(move || op(&config, &task_lock, &task_critical));

    let mut pending: Option<i32> = None;
    let joined = loop {
        let code = tokio::select! {
            joined = &mut task => break joined,
            _ = sigint.recv() => 130,
            _ = sigterm.recv() => 143,
        };

        if !critical.is_entered() {
            exit_on_signal(&lock, code);
        }
        if pending.is_none() {
            eprintln!("Signal received, finishing the current operation first");
        }
        pending = Some(code);
    };

    let result = joined.context("Command panicked").and_then(|r| r);
    if let Some(code) = pending {
        if let Err(e) = &result {
            eprintln!("Error: {:#}", e);
        }
        exit_on_signal(&lock, code);
    }
    result
}

fn exit_on_signal(lock: &LockHandle, code: i32) -> ! {
    eprintln!("Interrupted, releasing lock");
    lock.remove_file();
    std::process::exit(code)
}
