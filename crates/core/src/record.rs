//! File records and permission metadata

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

/// A captured file inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path of the live file at capture time
    pub original_path: PathBuf,
    /// Location under the snapshot directory (`original_path` minus the root)
    pub relative_path: PathBuf,
    /// Permission bits including setuid/setgid/sticky
    pub mode: u32,
    /// Owning uid
    pub owner: u32,
    /// Owning gid
    pub group: u32,
    /// Captured size, for reporting only
    pub size_bytes: u64,
}

impl FileRecord {
    /// Build a record from the metadata of the live file
    pub fn from_metadata(original_path: &Path, metadata: &fs::Metadata) -> Self {
        Self {
            original_path: original_path.to_path_buf(),
            relative_path: mirror_path(original_path),
            mode: metadata.mode() & 0o7777,
            owner: metadata.uid(),
            group: metadata.gid(),
            size_bytes: metadata.len(),
        }
    }

    /// Apply mode, owner and group to an open file
    pub fn apply_to(&self, file: &fs::File) -> io::Result<()> {
        std::os::unix::fs::fchown(file, Some(self.owner), Some(self.group))?;
        // chown may clear setuid/setgid, so permissions go last
        file.set_permissions(fs::Permissions::from_mode(self.mode))
    }

    /// True when `metadata` carries exactly this record's mode, owner and group
    pub fn metadata_matches(&self, metadata: &fs::Metadata) -> bool {
        metadata.mode() & 0o7777 == self.mode
            && metadata.uid() == self.owner
            && metadata.gid() == self.group
    }
}

/// Map an absolute path to its location inside a snapshot directory
///
/// `/etc/ssh/sshd_config` becomes `etc/ssh/sshd_config`. Only the root
/// component is dropped, so two distinct absolute paths never collide.
pub fn mirror_path(original: &Path) -> PathBuf {
    original
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect()
}

/// Inverse of [`mirror_path`]
pub fn original_path(relative: &Path) -> PathBuf {
    Path::new("/").join(relative)
}
