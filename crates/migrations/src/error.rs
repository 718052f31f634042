//! Error types for the migration engine
//!
//! Only connection, discovery, argument and configuration errors escape a
//! runner call; everything that goes wrong while executing a single
//! migration is folded into that migration's outcome instead.

use std::io;
use std::path::PathBuf;
use tabletop_core::ConfigError;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised by the loader, tracker and runner
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The database could not be reached
    #[error("Failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    /// The migration directory exists but could not be listed
    #[error("Failed to read migrations directory {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A migration file is malformed
    #[error("Invalid migration {filename}: {reason}")]
    Validation { filename: String, reason: String },

    /// The requested `up` target is not a pending migration
    #[error("Target migration {0} is not pending (already applied or does not exist)")]
    TargetNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A ledger row could not be decoded
    #[error("Malformed ledger entry: {0}")]
    Ledger(String),

    #[error("Failed to access migration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Driver errors keep their original message
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl MigrationError {
    /// Create a validation error for `filename`
    pub fn validation(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Create an IO error for `path`
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ConfigError> for MigrationError {
    fn from(err: ConfigError) -> Self {
        MigrationError::Configuration(err.to_string())
    }
}
