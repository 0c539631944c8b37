//! Single-instance execution lock
//!
//! One well-known file holds the PID of the process running a capture,
//! restore or cleanup. The lock is advisory: every mutating entry point takes
//! it through [`LockHandle::acquire`] and holds the handle until it is done.

use confsnap_core::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const ACQUIRE_ATTEMPTS: usize = 3;

/// Proof that this process holds the execution lock
///
/// The lock file is removed when the handle is dropped, so every exit path
/// that unwinds releases it. Signal exits call [`LockHandle::remove_file`].
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    holder_pid: u32,
}

impl LockHandle {
    /// Acquire the lock at `path`
    ///
    /// Fails with `AlreadyRunning` if a live process holds it and `force` is
    /// false. A lock whose holder is gone (or unreadable) is stale and is
    /// taken over.
    pub fn acquire(path: &Path, force: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("Failed to create {}", parent.display()), e))?;
        }

        let pid = std::process::id();

        for _ in 0..ACQUIRE_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    write!(file, "{}", pid)
                        .and_then(|_| file.sync_all())
                        .map_err(|e| Error::io("Failed to write lock file", e))?;
                    tracing::debug!("Acquired lock {} (pid {})", path.display(), pid);
                    return Ok(Self {
                        path: path.to_path_buf(),
                        holder_pid: pid,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    match read_holder(path) {
                        Some(holder) if is_process_alive(holder) => {
                            if !force {
                                return Err(Error::AlreadyRunning { pid: holder });
                            }
                            tracing::warn!("Forcing lock held by running process {}", holder);
                        }
                        Some(holder) => tracing::warn!("Removing stale lock (pid {} is gone)", holder),
                        None => tracing::warn!("Removing unreadable lock file {}", path.display()),
                    }

                    match fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(Error::io("Failed to remove stale lock file", e)),
                    }
                }
                Err(e) => {
                    return Err(Error::io(
                        format!("Failed to create lock file {}", path.display()),
                        e,
                    ))
                }
            }
        }

        // Lost every race for the file: someone else keeps re-creating it
        match read_holder(path) {
            Some(holder) => Err(Error::AlreadyRunning { pid: holder }),
            None => Err(Error::io(
                "Failed to acquire lock",
                io::Error::new(io::ErrorKind::WouldBlock, "lock file keeps reappearing"),
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn holder_pid(&self) -> u32 {
        self.holder_pid
    }

    /// Release the lock
    pub fn release(self) {
        // Drop does the work
    }

    /// Delete the lock file without consuming the handle
    ///
    /// Used on signal exits, where destructors do not run. A missing file is
    /// not an error.
    pub fn remove_file(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Released lock {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!("Could not remove lock {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.remove_file();
    }
}

/// PID stored in a lock file, if it holds one
fn read_holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Check if process is alive
pub fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    // Signal 0 checks existence without delivering anything
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true, // EPERM: exists, owned by someone else
    }
}
