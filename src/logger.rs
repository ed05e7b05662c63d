use anyhow::Result;

use crate::config::Config;

/// Initialize the `log` facade with `simple_logger`.
pub fn init(config: &Config) -> Result<()> {
    simple_logger::init_with_level(config.log.level.as_level())?;
    Ok(())
}
