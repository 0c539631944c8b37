//! Print the effective configuration

use crate::system_config::{self, SystemConfig};
use anyhow::Result;

pub fn run(config: &SystemConfig) -> Result<()> {
    // Fail early on a registry the other commands would reject
    config.registry()?;
    print!("{}", system_config::render(config)?);
    Ok(())
}
