//! confsnap core - on-disk snapshots of tracked host configuration files
//!
//! This crate provides:
//! - The error taxonomy shared by the engine and the CLI
//! - The tracked-file registry (the allow-list of snapshot-able paths)
//! - File records with permission and ownership metadata
//! - The snapshot store: timestamped, mirrored, completion-marked directories

pub mod error;
pub mod record;
pub mod registry;
pub mod store;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use record::{mirror_path, original_path, FileRecord};
pub use registry::{Registry, TrackedFile};
pub use store::{Manifest, Origin, Snapshot, SnapshotId, SnapshotStore, COMPLETE_MARKER};
