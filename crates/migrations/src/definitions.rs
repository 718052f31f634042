//! Migration Definitions - Core types for the migration engine
//!
//! Defines the loaded migration, the persisted ledger entry, and the
//! ephemeral results handed back to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A migration loaded from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Zero-padded sequence prefix, determines ordering
    pub sequence: u32,
    /// Human-readable slug (filename without prefix and extension)
    pub name: String,
    /// Full filename, the ledger key
    pub filename: String,
    /// SQL to apply the migration
    pub up_sql: String,
    /// SQL to rollback the migration
    pub down_sql: String,
    /// SHA-256 hex digest of the file bytes this definition was parsed from
    pub checksum: String,
}

impl Migration {
    /// SQL to run for `direction`
    pub fn sql(&self, direction: MigrationDirection) -> &str {
        match direction {
            MigrationDirection::Up => &self.up_sql,
            MigrationDirection::Down => &self.down_sql,
        }
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration (run UP statements)
    Up,
    /// Rollback the migration (run DOWN statements)
    Down,
}

impl std::fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// One row of the ledger table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub filename: String,
    pub executed_at: DateTime<Utc>,
    pub execution_time_ms: i64,
    pub checksum: String,
}

/// Result of executing a single migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    pub filename: String,
    pub success: bool,
    pub execution_time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationOutcome {
    pub fn succeeded(filename: impl Into<String>, execution_time_ms: i64) -> Self {
        Self {
            filename: filename.into(),
            success: true,
            execution_time_ms,
            error: None,
        }
    }

    pub fn failed(filename: impl Into<String>, execution_time_ms: i64, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: false,
            execution_time_ms,
            error: Some(error.into()),
        }
    }
}

/// Result of an `up` batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// True when no migration in the batch failed
    pub success: bool,
    /// Number of migrations that were applied
    pub migrations_run: usize,
    /// Per-migration results, in execution order
    pub results: Vec<MigrationOutcome>,
}

impl RunResult {
    /// Successful result for an empty batch
    pub fn empty() -> Self {
        Self::from_outcomes(Vec::new())
    }

    pub fn from_outcomes(results: Vec<MigrationOutcome>) -> Self {
        Self {
            success: results.iter().all(|r| r.success),
            migrations_run: results.iter().filter(|r| r.success).count(),
            results,
        }
    }

    /// Number of failed migrations (zero or one under fail-fast)
    pub fn failed_count(&self) -> usize {
        self.results.len() - self.migrations_run
    }
}

/// Result of a `down` batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackResult {
    /// True when no migration in the batch failed
    pub success: bool,
    /// Number of migrations that were rolled back
    pub migrations_rolled_back: usize,
    /// Per-migration results, in execution order (newest first)
    pub results: Vec<MigrationOutcome>,
}

impl RollbackResult {
    /// Successful result for an empty batch
    pub fn empty() -> Self {
        Self::from_outcomes(Vec::new())
    }

    pub fn from_outcomes(results: Vec<MigrationOutcome>) -> Self {
        Self {
            success: results.iter().all(|r| r.success),
            migrations_rolled_back: results.iter().filter(|r| r.success).count(),
            results,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.migrations_rolled_back
    }
}

/// Status of one discovered migration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub filename: String,
    pub executed: bool,
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Read-only snapshot combining discovered files with ledger membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Number of migration files discovered on disk
    pub total: usize,
    /// Number of ledger rows
    pub executed: usize,
    /// Number of discovered files absent from the ledger
    pub pending: usize,
    pub migrations: Vec<StatusEntry>,
}

impl StatusReport {
    /// Filenames still waiting to be applied, in order
    pub fn pending_migrations(&self) -> impl Iterator<Item = &str> {
        self.migrations
            .iter()
            .filter(|m| !m.executed)
            .map(|m| m.filename.as_str())
    }
}
