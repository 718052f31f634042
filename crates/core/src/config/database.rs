//! Database connection settings
//!
//! Either a complete `DATABASE_URL` or the individual `DB_*` parts. The URL
//! is assembled with the `url` crate so credentials are percent-encoded.

use super::app_config::env_or;
use super::{AppConfigTrait, ConfigError, ConfigSource};
use serde::Serialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use url::Url;

/// Supported database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    Postgres,
    Sqlite,
}

impl FromStr for DatabaseDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DatabaseDriver::Postgres),
            "sqlite" | "sqlite3" => Ok(DatabaseDriver::Sqlite),
            _ => Err(ConfigError::invalid_value(
                "driver",
                s,
                "postgres or sqlite",
            )),
        }
    }
}

impl std::fmt::Display for DatabaseDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseDriver::Postgres => write!(f, "postgres"),
            DatabaseDriver::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseConfig {
    pub driver: DatabaseDriver,
    pub host: String,
    pub port: u16,
    /// Database name, or the database file path for SQLite
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Explicit URL; takes precedence over the individual parts
    #[serde(skip_serializing)]
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::Postgres,
            host: "localhost".to_string(),
            port: 5432,
            name: "tabletop".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            url: None,
        }
    }
}

impl DatabaseConfig {
    /// Configuration pointing at an explicit URL
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Build the connection URL handed to the driver.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        match self.driver {
            DatabaseDriver::Sqlite => Ok(format!("sqlite://{}?mode=rwc", self.name)),
            DatabaseDriver::Postgres => {
                let base = format!("postgres://{}:{}", self.host, self.port);
                let mut url = Url::parse(&base)
                    .map_err(|e| ConfigError::invalid_value("host", &self.host, e.to_string()))?;

                url.set_username(&self.user)
                    .map_err(|_| ConfigError::invalid_value("user", &self.user, "a valid user name"))?;
                if !self.password.is_empty() {
                    url.set_password(Some(&self.password)).map_err(|_| {
                        ConfigError::invalid_value("password", "<redacted>", "a valid password")
                    })?;
                }
                url.set_path(&format!("/{}", self.name.trim_start_matches('/')));

                Ok(url.to_string())
            }
        }
    }
}

impl AppConfigTrait for DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let driver = env_or("DB_DRIVER", &defaults.driver.to_string()).parse()?;

        let port_str = env_or("DB_PORT", &defaults.port.to_string());
        let port = port_str.parse::<u16>().map_err(|_| {
            ConfigError::invalid_value("port", &port_str, "valid port number (1-65535)")
        })?;

        let config = Self {
            driver,
            host: env_or("DB_HOST", &defaults.host),
            port,
            name: env_or("DB_NAME", &defaults.name),
            user: env_or("DB_USER", &defaults.user),
            password: env_or("DB_PASSWORD", ""),
            url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_some() {
            return Ok(());
        }

        if self.name.trim().is_empty() {
            return Err(ConfigError::validation_failed(
                "name",
                "database name must not be empty",
            ));
        }

        if self.driver == DatabaseDriver::Postgres {
            if self.port == 0 {
                return Err(ConfigError::invalid_value(
                    "port",
                    "0",
                    "port between 1 and 65535",
                ));
            }
            if self.host.trim().is_empty() {
                return Err(ConfigError::validation_failed("host", "host must not be empty"));
            }
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("driver".to_string(), ConfigSource::for_env("DB_DRIVER", "postgres"));
        sources.insert("host".to_string(), ConfigSource::for_env("DB_HOST", "localhost"));
        sources.insert("port".to_string(), ConfigSource::for_env("DB_PORT", "5432"));
        sources.insert("name".to_string(), ConfigSource::for_env("DB_NAME", "tabletop"));
        sources.insert("user".to_string(), ConfigSource::for_env("DB_USER", "postgres"));
        sources.insert("password".to_string(), ConfigSource::for_env("DB_PASSWORD", ""));
        sources.insert(
            "url".to_string(),
            if self.url.is_some() {
                ConfigSource::EnvVar("DATABASE_URL".to_string())
            } else {
                ConfigSource::Derived
            },
        );
        sources
    }
}
