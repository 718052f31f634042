use super::{ConfigError, ConfigSource, DatabaseConfig, MigrationSettings};
use crate::logging::LoggingConfig;
use std::collections::HashMap;
use std::env;

/// Configuration trait for sections loaded from the environment
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Complete configuration for the migration tooling
///
/// Read once at startup; every component receives its section as plain data.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationSettings,
    pub logging: LoggingConfig,
}

impl AppConfigTrait for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            database: DatabaseConfig::from_env()?,
            migrations: MigrationSettings::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.migrations.validate()?;
        self.logging.validate()
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        let sections = [
            ("database", self.database.config_sources()),
            ("migrations", self.migrations.config_sources()),
            ("logging", self.logging.config_sources()),
        ];
        for (section, fields) in sections {
            for (field, source) in fields {
                sources.insert(format!("{}.{}", section, field), source);
            }
        }
        sources
    }
}

/// Read `key` from the environment, or fall back to `default`.
pub(crate) fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
