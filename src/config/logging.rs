//! Structured logging setup

use serde::Deserialize;
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::error::{ConfigError, ValidationError};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line, for log shippers
    Json,
    /// Multi-line human readable output
    Pretty,
    #[default]
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Level for this crate (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line numbers
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            return Err(ValidationError::InvalidLogLevel(self.level.clone()));
        }
        Ok(())
    }

    /// Builds the filter: `RUST_LOG` when set, otherwise the configured
    /// level, with chatty dependencies turned down either way.
    fn env_filter(&self) -> EnvFilter {
        std::env::var("RUST_LOG")
            .map_or_else(|_| EnvFilter::new(&self.level), EnvFilter::new)
            .add_directive(
                "hyper=warn"
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::WARN.into()),
            )
            .add_directive(
                "reqwest=warn"
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::WARN.into()),
            )
            .add_directive(
                "sqlx=warn"
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::WARN.into()),
            )
            .add_directive(
                format!("queryon={}", self.level)
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::INFO.into()),
            )
    }

    /// Install the global subscriber. Output goes to stderr so it never
    /// interleaves with chat output on stdout.
    ///
    /// # Errors
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(&self) -> Result<(), ConfigError> {
        let registry = tracing_subscriber::registry().with(self.env_filter());

        let result = match self.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_target(true)
                        .with_writer(io::stderr),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_writer(io::stderr),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_target(false)
                        .with_writer(io::stderr),
                )
                .try_init(),
        };
        result.map_err(|e| ConfigError::Logging(e.to_string()))?;

        tracing::info!(
            level = %self.level,
            format = ?self.format,
            version = env!("CARGO_PKG_VERSION"),
            "Logging initialized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_unknown_level() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidLogLevel("loud".to_string()))
        );
    }

    #[test]
    fn test_level_is_case_insensitive() {
        let config = LoggingConfig {
            level: "DEBUG".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
