//! Tracked-file registry
//!
//! The registry is the allow-list of absolute paths confsnap may capture or
//! restore. It is configuration data: the engine only asks whether a path is
//! a member and which hooks belong to it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// One tracked configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    /// Absolute, normalized path of the live file
    pub path: PathBuf,

    /// Shell command run after this file is restored (e.g. `sysctl --system`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload: Option<String>,

    /// Shell command that must accept the staged file before it replaces the
    /// live one. `{path}` expands to the staged file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<String>,
}

impl TrackedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reload: None,
            validate: None,
        }
    }

    pub fn with_reload(mut self, command: impl Into<String>) -> Self {
        self.reload = Some(command.into());
        self
    }

    pub fn with_validate(mut self, command: impl Into<String>) -> Self {
        self.validate = Some(command.into());
        self
    }
}

/// Allow-list of paths eligible for capture and restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    entries: Vec<TrackedFile>,
}

impl Registry {
    /// Build a registry, rejecting relative, non-normalized and duplicate paths
    pub fn new(entries: Vec<TrackedFile>) -> Result<Self> {
        let mut seen = HashSet::new();

        for entry in &entries {
            validate_path(&entry.path)?;
            if !seen.insert(entry.path.clone()) {
                return Err(Error::InvalidRegistry(format!(
                    "{} is listed more than once",
                    entry.path.display()
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Files a freshly provisioned workstation has confsnap guard
    pub fn defaults() -> Self {
        Self {
            entries: vec![
                TrackedFile::new("/etc/fstab").with_reload("mount -a"),
                TrackedFile::new("/etc/sysctl.conf").with_reload("sysctl --system"),
                TrackedFile::new("/etc/sudoers").with_validate("visudo -cf {path}"),
                TrackedFile::new("/etc/ssh/sshd_config")
                    .with_validate("sshd -t -f {path}")
                    .with_reload("systemctl reload ssh"),
                TrackedFile::new("/etc/environment"),
            ],
        }
    }

    pub fn entries(&self) -> &[TrackedFile] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.path.as_path())
    }

    pub fn get(&self, path: &Path) -> Option<&TrackedFile> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    /// Fail with `UntrackedPath` on the first path outside the registry
    pub fn check<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> Result<()> {
        for path in paths {
            if !self.contains(path) {
                return Err(Error::UntrackedPath(path.to_path_buf()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::InvalidRegistry(format!(
            "{} is not an absolute path",
            path.display()
        )));
    }

    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::RootDir => {}
            Component::Normal(_) => normal += 1,
            _ => {
                return Err(Error::InvalidRegistry(format!(
                    "{} is not normalized",
                    path.display()
                )))
            }
        }
    }

    if normal == 0 {
        return Err(Error::InvalidRegistry("the filesystem root cannot be tracked".into()));
    }

    Ok(())
}
