//! Migration directory and ledger settings

use super::app_config::env_or;
use super::{validate_identifier, AppConfigTrait, ConfigError, ConfigSource};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Default filename pattern: three-digit sequence, underscore, slug, `.sql`
pub const DEFAULT_FILENAME_PATTERN: &str = r"^\d{3}_.+\.sql$";

/// Settings consumed by the migration loader and tracker
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSettings {
    /// Directory where migration files are stored
    pub directory: PathBuf,
    /// Table name for tracking applied migrations
    pub table: String,
    /// Regex a filename must match to be treated as a migration
    pub filename_pattern: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("migrations"),
            table: "migrations".to_string(),
            filename_pattern: DEFAULT_FILENAME_PATTERN.to_string(),
        }
    }
}

impl MigrationSettings {
    /// Settings for a directory with the default table and pattern
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Override the ledger table name
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Compile the filename pattern
    pub fn compiled_pattern(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.filename_pattern)
            .map_err(|e| ConfigError::validation_failed("filename_pattern", e.to_string()))
    }
}

impl AppConfigTrait for MigrationSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            directory: PathBuf::from(env_or(
                "MIGRATIONS_DIR",
                &defaults.directory.to_string_lossy(),
            )),
            table: env_or("MIGRATIONS_TABLE", &defaults.table),
            filename_pattern: env_or("MIGRATIONS_PATTERN", &defaults.filename_pattern),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("table", &self.table)?;
        self.compiled_pattern()?;

        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::validation_failed(
                "directory",
                "migration directory must not be empty",
            ));
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert(
            "directory".to_string(),
            ConfigSource::for_env("MIGRATIONS_DIR", "migrations"),
        );
        sources.insert(
            "table".to_string(),
            ConfigSource::for_env("MIGRATIONS_TABLE", "migrations"),
        );
        sources.insert(
            "filename_pattern".to_string(),
            ConfigSource::for_env("MIGRATIONS_PATTERN", DEFAULT_FILENAME_PATTERN),
        );
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_test_env() {
        env::remove_var("MIGRATIONS_DIR");
        env::remove_var("MIGRATIONS_TABLE");
        env::remove_var("MIGRATIONS_PATTERN");
    }

    #[test]
    fn test_default_pattern_matches_sequenced_files() {
        let pattern = MigrationSettings::default().compiled_pattern().unwrap();
        assert!(pattern.is_match("001_create_tables.sql"));
        assert!(pattern.is_match("042_add_receipt_footer.sql"));
        assert!(!pattern.is_match("1_create_tables.sql"));
        assert!(!pattern.is_match("0001create.sql"));
        assert!(!pattern.is_match("001_create_tables.js"));
        assert!(!pattern.is_match("README.md"));
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let settings = MigrationSettings::default().table("ledger; DROP TABLE orders");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let settings = MigrationSettings {
            filename_pattern: "^(\\d{3}".to_string(),
            ..MigrationSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed { ref field, .. } if field == "filename_pattern"));
    }

    #[test]
    #[serial]
    fn test_migration_settings_from_env() {
        clean_test_env();
        env::set_var("MIGRATIONS_DIR", "db/migrations");
        env::set_var("MIGRATIONS_TABLE", "schema_ledger");

        let settings = MigrationSettings::from_env().unwrap();
        assert_eq!(settings.directory, PathBuf::from("db/migrations"));
        assert_eq!(settings.table, "schema_ledger");
        assert_eq!(settings.filename_pattern, DEFAULT_FILENAME_PATTERN);

        let sources = settings.config_sources();
        assert_eq!(
            sources["table"],
            ConfigSource::EnvVar("MIGRATIONS_TABLE".to_string())
        );
        assert_eq!(
            sources["filename_pattern"],
            ConfigSource::Default(DEFAULT_FILENAME_PATTERN.to_string())
        );

        clean_test_env();
    }
}
