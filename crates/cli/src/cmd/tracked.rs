//! Print the tracked-file registry

use crate::system_config::SystemConfig;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(config: &SystemConfig) -> Result<()> {
    let registry = config.registry()?;

    if registry.is_empty() {
        println!("{}", "No tracked files configured".dimmed());
        return Ok(());
    }

    println!("{} ({})", "Tracked files".bold(), registry.len());
    println!();

    for entry in registry.entries() {
        let status = if entry.path.exists() {
            "present".green().to_string()
        } else {
            "absent".dimmed().to_string()
        };
        println!("  {:<8} {}", status, entry.path.display());
        if let Some(validate) = &entry.validate {
            println!("           {} {}", "validate:".dimmed(), validate);
        }
        if let Some(reload) = &entry.reload {
            println!("           {} {}", "reload:".dimmed(), reload);
        }
    }

    Ok(())
}
