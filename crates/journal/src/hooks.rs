//! Shell hooks around a restore
//!
//! Two kinds of hook come from the registry: `validate` runs against the
//! staged copy before it replaces the live file, `reload` tells the owning
//! subsystem that its file changed. confsnap only emits the signal; what a
//! reload means is up to the command.

use crate::Result;
use confsnap_core::{Error, TrackedFile};
use std::path::Path;
use std::process::Command;

/// Receives a signal for every tracked file a restore rewrote
pub trait ReloadNotifier {
    fn notify(&self, tracked: &TrackedFile) -> Result<()>;
}

impl<T: ReloadNotifier + ?Sized> ReloadNotifier for &T {
    fn notify(&self, tracked: &TrackedFile) -> Result<()> {
        (**self).notify(tracked)
    }
}

/// Runs the entry's `reload` command through `sh -c`
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandNotifier;

impl ReloadNotifier for CommandNotifier {
    fn notify(&self, tracked: &TrackedFile) -> Result<()> {
        let Some(command) = tracked.reload.as_deref() else {
            return Ok(());
        };

        tracing::info!("Reloading after restore of {}: {}", tracked.path.display(), command);
        run_shell(command, &tracked.path).map_err(|reason| Error::NotifyFailed {
            path: tracked.path.clone(),
            reason,
        })
    }
}

/// Ignores every signal
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ReloadNotifier for NoopNotifier {
    fn notify(&self, _tracked: &TrackedFile) -> Result<()> {
        Ok(())
    }
}

/// Run a `validate` command against a staged file
pub fn validate_staged(command: &str, staged: &Path) -> std::result::Result<(), String> {
    run_shell(command, staged).map_err(|reason| format!("validation rejected the file: {}", reason))
}

/// Run `command` with `{path}` expanded, failing on spawn error or non-zero exit
fn run_shell(command: &str, path: &Path) -> std::result::Result<(), String> {
    let expanded = command.replace("{path}", &shell_quote(&path.to_string_lossy()));

    let output = Command::new("sh")
        .arg("-c")
        .arg(&expanded)
        .output()
        .map_err(|e| format!("failed to run `{}`: {}", expanded, e))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Err(format!("`{}` exited with {}", expanded, output.status))
    } else {
        Err(format!("`{}` exited with {}: {}", expanded, output.status, stderr))
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
