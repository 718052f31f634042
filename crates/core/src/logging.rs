//! # Structured Logging
//!
//! Tracing subscriber setup for the migration tooling. Library code only
//! emits `tracing` events; binaries call [`init_logging`] once at startup.

use crate::config::app_config::env_or;
use crate::config::{AppConfigTrait, ConfigError, ConfigSource};
use std::collections::HashMap;
use std::env;
use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Include file and line number information
    pub include_location: bool,
    /// Environment filter (supports complex filters like "tabletop_migrations=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    ///
    /// sqlx logs every statement at info, which drowns out migration output.
    pub fn directive(&self) -> String {
        match &self.env_filter {
            Some(filter) => filter.clone(),
            None => format!("{},sqlx=warn", self.level),
        }
    }
}

impl AppConfigTrait for LoggingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let level = env_or("LOG_LEVEL", "info").to_lowercase();
        let format = env_or("LOG_FORMAT", "text").to_lowercase();

        let json_format = match format.as_str() {
            "json" => true,
            "text" | "plain" | "pretty" => false,
            _ => {
                return Err(ConfigError::invalid_value(
                    "log_format",
                    format,
                    "text or json",
                ))
            }
        };

        let location = env_or("LOG_LOCATION", "false").to_lowercase();
        let include_location = match location.as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                return Err(ConfigError::invalid_value(
                    "log_location",
                    location,
                    "true or false",
                ))
            }
        };

        let config = Self {
            level,
            json_format,
            include_location,
            env_filter: env::var("LOG_FILTER").ok().filter(|f| !f.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LEVELS.contains(&self.level.as_str()) {
            return Err(ConfigError::invalid_value(
                "log_level",
                self.level.clone(),
                format!("one of: {}", VALID_LEVELS.join(", ")),
            ));
        }
        if let Some(filter) = &self.env_filter {
            EnvFilter::try_new(filter).map_err(|e| {
                ConfigError::invalid_value("log_filter", filter.clone(), e.to_string())
            })?;
        }
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("level".to_string(), ConfigSource::for_env("LOG_LEVEL", "info"));
        sources.insert("format".to_string(), ConfigSource::for_env("LOG_FORMAT", "text"));
        sources.insert(
            "include_location".to_string(),
            ConfigSource::for_env("LOG_LOCATION", "false"),
        );
        sources.insert("env_filter".to_string(), ConfigSource::for_env("LOG_FILTER", ""));
        sources
    }
}

/// Initialize logging for the process.
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to
/// stderr so command output on stdout stays machine-readable.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config.directive()))?;

    let layer = Layer::new()
        .with_writer(io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()?;
    }

    tracing::debug!(
        target: "tabletop::logging",
        "Logging initialized (level: {}, format: {})",
        config.level,
        if config.json_format { "JSON" } else { "text" }
    );

    Ok(())
}
