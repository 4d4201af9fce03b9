//! Structured logging setup.
//!
//! The engine logs through `tracing`; this installs a `tracing-subscriber`
//! formatter for hosts that do not bring their own.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include file and line
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file_info: false,
        }
    }
}

impl LoggingConfig {
    /// Parsed minimum level.
    pub fn level(&self) -> Result<Level> {
        parse_log_level(&self.level)
    }
}

/// Parse a log level name.
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| Error::InvalidConfig(format!("invalid log level: {}", level)))
}

/// Install the global subscriber.
///
/// `RUST_LOG` directives are honored on top of the configured level. Fails
/// if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = config.level()?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("logging already initialized: {}", e)))?;

    tracing::info!(level = %level, format = ?config.format, "logging initialized");
    Ok(())
}
