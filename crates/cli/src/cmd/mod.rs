//! CLI command implementations

pub mod capture;
pub mod cleanup_backups;
pub mod config;
pub mod list_backups;
pub mod restore;
pub mod show;
pub mod tracked;
