//! System-wide configuration for confsnap
//!
//! Looked up in this order:
//! 1. `--config <PATH>` or `CONFSNAP_CONFIG`
//! 2. `/etc/confsnap/config.toml` when running as root
//! 3. `~/.config/confsnap/config.toml` otherwise
//!
//! A missing file at 2 or 3 means defaults; a missing explicit file is an error.

use anyhow::{Context, Result};
use confsnap_core::{Registry, SnapshotStore, TrackedFile};
use confsnap_journal::{Catalog, RetentionPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// System-wide confsnap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Where snapshots and the lock live
    pub paths: PathsConfig,

    /// Retention configuration
    pub retention: RetentionConfig,

    /// Tracked-file registry
    pub tracked: Vec<TrackedFile>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            retention: RetentionConfig::default(),
            tracked: Registry::defaults().entries().to_vec(),
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Snapshot directory root (default: /var/backups/confsnap)
    pub backup_root: PathBuf,

    /// Execution lock file (default: /run/confsnap.lock)
    pub lock_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            backup_root: PathBuf::from("/var/backups/confsnap"),
            lock_file: PathBuf::from("/run/confsnap.lock"),
        }
    }
}

/// Retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Number of snapshots to keep (default: 5)
    pub max_snapshots: usize,

    /// Run cleanup after every capture (default: false)
    pub auto_cleanup: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_snapshots: 5,
            auto_cleanup: false,
        }
    }
}

impl RetentionConfig {
    /// Convert to confsnap_journal::RetentionPolicy
    pub fn to_retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_snapshots: self.max_snapshots,
        }
    }
}

impl SystemConfig {
    /// Validated tracked-file registry
    pub fn registry(&self) -> Result<Registry> {
        Registry::new(self.tracked.clone()).context("Invalid [[tracked]] entries in configuration")
    }

    /// Snapshot store over the configured backup root
    pub fn store(&self) -> Result<SnapshotStore> {
        Ok(SnapshotStore::new(&self.paths.backup_root, self.registry()?))
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(&self.paths.backup_root)
    }
}

/// Get the system config file path
pub fn config_file_path() -> Option<PathBuf> {
    if nix::unistd::Uid::effective().is_root() {
        return Some(PathBuf::from("/etc/confsnap/config.toml"));
    }
    dirs::config_dir().map(|c| c.join("confsnap/config.toml"))
}

/// Load system configuration
pub fn load(explicit: Option<&Path>) -> Result<SystemConfig> {
    if let Some(path) = explicit {
        return read(path);
    }

    let config_path = match config_file_path() {
        Some(p) => p,
        None => {
            tracing::debug!("Could not determine config directory, using defaults");
            return Ok(SystemConfig::default());
        }
    };

    if !config_path.exists() {
        tracing::debug!("System config not found at {}, using defaults", config_path.display());
        return Ok(SystemConfig::default());
    }

    read(&config_path)
}

fn read(path: &Path) -> Result<SystemConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;

    let config: SystemConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;

    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Render the effective configuration as TOML
pub fn render(config: &SystemConfig) -> Result<String> {
    let mut content = String::from("# confsnap configuration\n\n");
    content.push_str(&toml::to_string_pretty(config).context("Failed to serialize config")?);
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SystemConfig::default();

        assert_eq!(config.paths.backup_root, PathBuf::from("/var/backups/confsnap"));
        assert_eq!(config.paths.lock_file, PathBuf::from("/run/confsnap.lock"));
        assert_eq!(config.retention.max_snapshots, 5);
        assert!(!config.retention.auto_cleanup);
        assert_eq!(config.registry().unwrap(), Registry::defaults());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: SystemConfig = toml::from_str(
            r#"
[retention]
max_snapshots = 3
"#,
        )
        .unwrap();

        assert_eq!(config.retention.max_snapshots, 3);
        assert_eq!(config.retention.to_retention_policy().max_snapshots, 3);
        assert_eq!(config.paths.backup_root, PathBuf::from("/var/backups/confsnap"));
        assert_eq!(config.tracked.len(), Registry::defaults().len());
    }

    #[test]
    fn test_tracked_entries_parsed() {
        let config: SystemConfig = toml::from_str(
            r#"
[paths]
backup_root = "/srv/backups"

[[tracked]]
path = "/etc/sysctl.conf"
reload = "sysctl --system"

[[tracked]]
path = "/etc/sudoers"
validate = "visudo -cf {path}"
"#,
        )
        .unwrap();

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);
        let sysctl = registry.get(Path::new("/etc/sysctl.conf")).unwrap();
        assert_eq!(sysctl.reload.as_deref(), Some("sysctl --system"));
        assert_eq!(config.store().unwrap().root(), Path::new("/srv/backups"));
    }

    #[test]
    fn test_invalid_tracked_entry_rejected() {
        let config: SystemConfig = toml::from_str(
            r#"
[[tracked]]
path = "relative/file"
"#,
        )
        .unwrap();

        assert!(config.registry().is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = SystemConfig::default();
        let rendered = render(&config).unwrap();
        let parsed: SystemConfig = toml::from_str(&rendered).unwrap();

        assert_eq!(parsed.retention.max_snapshots, config.retention.max_snapshots);
        assert_eq!(parsed.tracked, config.tracked);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let temp = TempDir::new().unwrap();
        assert!(load(Some(&temp.path().join("missing.toml"))).is_err());

        let path = temp.path().join("config.toml");
        fs::write(&path, "[retention]\nauto_cleanup = true\n").unwrap();
        assert!(load(Some(&path)).unwrap().retention.auto_cleanup);
    }
}
