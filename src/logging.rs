//! Tracing subscriber setup.

use std::str::FromStr;

use tracing::Level;

use crate::config::{ConfigError, LoggingConfig};

/// Parses the configured level name.
pub fn parse_level(level: &str) -> Result<Level, ConfigError> {
    Level::from_str(level.trim()).map_err(|_| ConfigError::Invalid {
        field: "logging.level",
        reason: format!("unknown level '{level}', expected error, warn, info, debug or trace"),
    })
}

/// Installs a global fmt subscriber at the configured level.
///
/// Returns `Ok(false)` when a global subscriber was already installed, so
/// embedders and tests can call this more than once.
pub fn init(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let level = parse_level(&config.level)?;
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok();
    Ok(installed)
}
