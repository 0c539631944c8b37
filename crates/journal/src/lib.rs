//! Snapshot catalog, retention and restore
//!
//! This crate provides:
//! - The catalog: a directory walk over the backup root, newest first
//! - The retention manager ("keep last N", plus garbage from aborted captures)
//! - The restore engine with its pre-restore safety snapshot
//! - Shell hooks for staged-file validation and post-restore reloads

pub mod catalog;
pub mod hooks;
pub mod restore;
pub mod retention;

// Re-exports
pub use catalog::{Catalog, IncompleteSnapshot, SnapshotSummary};
pub use hooks::{CommandNotifier, NoopNotifier, ReloadNotifier};
pub use restore::{FileOutcome, PlannedAction, RestoreEngine, RestoreSession, RestoreState};
pub use retention::{CleanupReport, RetentionManager, RetentionPolicy};

/// Result type for journal operations
pub type Result<T> = confsnap_core::Result<T>;
