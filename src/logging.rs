//! Logging setup.
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_logging`] once.
//!
//! ## Configuration priority
//!
//! 1. [`LogConfig::level`] / [`LogConfig::file`] (highest)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `sqlextract=info`
//!
//! ```bash
//! RUST_LOG=sqlextract=debug ./nightly-export
//! ```

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{self, time::SystemTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{ExtractError, Result};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: "off", "error", "warn", "info", "debug" or "trace".
    #[serde(default)]
    pub level: Option<String>,
    /// Log file path. If unset, logs go to stderr.
    #[serde(default)]
    pub file: Option<String>,
}

impl LogConfig {
    fn filter(&self) -> EnvFilter {
        match &self.level {
            Some(level) => EnvFilter::new(format!("sqlextract={}", level.to_lowercase())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sqlextract=info")),
        }
    }

    fn is_off(&self) -> bool {
        self.level
            .as_deref()
            .map_or(false, |level| level.eq_ignore_ascii_case("off"))
    }
}

/// Install the global `tracing` subscriber.
///
/// Only the first call per process has an effect. Returns whether this call
/// installed the subscriber.
pub fn init_logging(config: &LogConfig) -> Result<bool> {
    if LOGGING_INITIALIZED.get().is_some() || config.is_off() {
        return Ok(false);
    }

    let file = match &config.file {
        Some(path) => Some(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    ExtractError::config(format!("failed to open log file {}: {}", path, e))
                })?,
        ),
        None => None,
    };

    let mut installed = false;
    LOGGING_INITIALIZED.get_or_init(|| {
        let registry = tracing_subscriber::registry().with(config.filter());
        installed = match file {
            Some(file) => registry
                .with(
                    fmt::layer()
                        .with_writer(std::sync::Arc::new(file))
                        .with_ansi(false)
                        .with_timer(SystemTime),
                )
                .try_init()
                .is_ok(),
            None => registry
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_timer(SystemTime),
                )
                .try_init()
                .is_ok(),
        };
    });
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_from_json() {
        let config: LogConfig = serde_json::from_str(r#"{"level": "DEBUG"}"#).unwrap();
        assert_eq!(config.level.as_deref(), Some("DEBUG"));
        assert!(config.file.is_none());
    }

    #[test]
    fn test_off_level_installs_nothing() {
        let config = LogConfig {
            level: Some("OFF".to_string()),
            file: None,
        };
        assert!(!init_logging(&config).unwrap());
    }

    #[test]
    fn test_unwritable_log_file_is_config_error() {
        let config = LogConfig {
            level: Some("info".to_string()),
            file: Some("/nonexistent-dir/sqlextract.log".to_string()),
        };
        // Only meaningful before any subscriber is installed in this process.
        if LOGGING_INITIALIZED.get().is_none() {
            assert!(matches!(
                init_logging(&config),
                Err(ExtractError::Config(_))
            ));
        }
    }
}
