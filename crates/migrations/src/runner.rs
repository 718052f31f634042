//! Migration Runner - Executes migrations against the database
//!
//! Every call opens its own connection, reconciles the files on disk with
//! the ledger, runs the selected batch one migration at a time, and closes
//! the connection again. Each migration runs in its own transaction together
//! with its ledger update; a failure stops the batch.

use sqlx::{AnyConnection, Connection, Executor};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tabletop_core::{AppConfig, MigrationSettings};

use crate::definitions::{
    LedgerEntry, Migration, MigrationDirection, MigrationOutcome, RunResult, StatusEntry,
    StatusReport,
};
use crate::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};
use crate::loader::MigrationLoader;
use crate::tracker::MigrationTracker;

/// Migration runner that executes migrations against a database
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    database_url: String,
    loader: MigrationLoader,
    tracker: MigrationTracker,
}

impl MigrationRunner {
    /// Create a runner for `database_url` with the given migration settings
    pub fn new(database_url: impl Into<String>, settings: &MigrationSettings) -> MigrationResult<Self> {
        let database_url = database_url.into();
        let dialect = Dialect::from_url(&database_url)?;

        Ok(Self {
            loader: MigrationLoader::new(settings)?,
            tracker: MigrationTracker::new(settings.table.clone(), dialect),
            database_url,
        })
    }

    /// Create a runner from the application configuration
    pub fn from_config(config: &AppConfig) -> MigrationResult<Self> {
        Self::new(config.database.connection_url()?, &config.migrations)
    }

    /// Get the migration loader
    pub fn loader(&self) -> &MigrationLoader {
        &self.loader
    }

    /// Get the ledger tracker
    pub fn tracker(&self) -> &MigrationTracker {
        &self.tracker
    }

    /// Apply pending migrations in order.
    ///
    /// With a `target`, only pending migrations up to and including it run.
    pub async fn up(&self, target: Option<&str>) -> MigrationResult<RunResult> {
        if let Some(target) = target {
            // Unknown targets are rejected before the database is touched
            if !self.loader.list_migration_files()?.iter().any(|f| f == target) {
                return Err(MigrationError::TargetNotFound(target.to_string()));
            }
        }

        let mut conn = self.connect().await?;
        let result = self.apply_pending(&mut conn, target).await;
        self.disconnect(conn).await;
        result
    }

    /// Report every discovered migration with its ledger state
    pub async fn status(&self) -> MigrationResult<StatusReport> {
        let mut conn = self.connect().await?;
        let result = self.collect_status(&mut conn).await;
        self.disconnect(conn).await;
        result
    }

    async fn apply_pending(
        &self,
        conn: &mut AnyConnection,
        target: Option<&str>,
    ) -> MigrationResult<RunResult> {
        let executed = self.tracker.get_executed_migrations(conn).await?;
        let all = self.loader.list_migration_files()?;
        let batch = select_pending(&all, &executed, target)?;

        if batch.is_empty() {
            tracing::info!("No pending migrations");
            return Ok(RunResult::empty());
        }

        tracing::info!(count = batch.len(), "Applying pending migrations");
        let outcomes = self.run_batch(conn, &batch, MigrationDirection::Up).await;
        Ok(RunResult::from_outcomes(outcomes))
    }

    async fn collect_status(&self, conn: &mut AnyConnection) -> MigrationResult<StatusReport> {
        let executed = self.tracker.get_executed_migrations(conn).await?;
        let all = self.loader.list_migration_files()?;

        let ledger: HashMap<&str, &LedgerEntry> =
            executed.iter().map(|e| (e.filename.as_str(), e)).collect();

        let migrations: Vec<StatusEntry> = all
            .into_iter()
            .map(|filename| {
                let entry = ledger.get(filename.as_str());
                StatusEntry {
                    executed: entry.is_some(),
                    executed_at: entry.map(|e| e.executed_at),
                    execution_time_ms: entry.map(|e| e.execution_time_ms),
                    checksum: entry.map(|e| e.checksum.clone()),
                    filename,
                }
            })
            .collect();

        let pending = migrations.iter().filter(|m| !m.executed).count();
        Ok(StatusReport {
            total: migrations.len(),
            executed: executed.len(),
            pending,
            migrations,
        })
    }

    /// Run `filenames` in order, stopping at the first failure
    pub(crate) async fn run_batch(
        &self,
        conn: &mut AnyConnection,
        filenames: &[String],
        direction: MigrationDirection,
    ) -> Vec<MigrationOutcome> {
        let mut outcomes = Vec::with_capacity(filenames.len());

        for filename in filenames {
            let outcome = self.run_migration(conn, filename, direction).await;
            let failed = !outcome.success;
            outcomes.push(outcome);

            if failed {
                let skipped = filenames.len() - outcomes.len();
                if skipped > 0 {
                    tracing::warn!(skipped, "Stopping batch after failed migration");
                }
                break;
            }
        }

        outcomes
    }

    /// Execute a single migration and its ledger update in one transaction.
    ///
    /// Errors never escape; they are reported in the returned outcome.
    pub async fn run_migration(
        &self,
        conn: &mut AnyConnection,
        filename: &str,
        direction: MigrationDirection,
    ) -> MigrationOutcome {
        let started = Instant::now();

        match self.execute_in_transaction(conn, filename, direction, started).await {
            Ok(()) => {
                let elapsed = elapsed_ms(started);
                tracing::info!(
                    migration = %filename,
                    %direction,
                    elapsed_ms = elapsed,
                    "Migration completed"
                );
                MigrationOutcome::succeeded(filename, elapsed)
            }
            Err(err) => {
                let elapsed = elapsed_ms(started);
                tracing::warn!(
                    migration = %filename,
                    %direction,
                    elapsed_ms = elapsed,
                    error = %err,
                    "Migration failed"
                );
                MigrationOutcome::failed(filename, elapsed, err.to_string())
            }
        }
    }

    async fn execute_in_transaction(
        &self,
        conn: &mut AnyConnection,
        filename: &str,
        direction: MigrationDirection,
        started: Instant,
    ) -> MigrationResult<()> {
        let migration = self.loader.load_migration(filename)?;

        let mut transaction = conn.begin().await?;
        match self.apply(&mut *transaction, &migration, direction, started).await {
            Ok(()) => {
                transaction.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::error!(
                        migration = %filename,
                        error = %rollback_err,
                        "Failed to roll back migration transaction"
                    );
                }
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        conn: &mut AnyConnection,
        migration: &Migration,
        direction: MigrationDirection,
        started: Instant,
    ) -> MigrationResult<()> {
        let sql = migration.sql(direction);
        if !sql.is_empty() {
            // Raw execution: a body may hold several statements
            (&mut *conn).execute(sql).await?;
        }

        match direction {
            MigrationDirection::Up => {
                self.tracker
                    .record_migration(conn, &migration.filename, elapsed_ms(started), &migration.checksum)
                    .await
            }
            MigrationDirection::Down => {
                self.tracker.remove_migration(conn, &migration.filename).await?;
                Ok(())
            }
        }
    }

    pub(crate) async fn connect(&self) -> MigrationResult<AnyConnection> {
        sqlx::any::install_default_drivers();
        AnyConnection::connect(&self.database_url)
            .await
            .map_err(MigrationError::Connection)
    }

    pub(crate) async fn disconnect(&self, conn: AnyConnection) {
        if let Err(err) = conn.close().await {
            tracing::warn!(error = %err, "Failed to close database connection");
        }
    }
}

/// Pending migrations in file order, optionally truncated at `target` (inclusive)
pub fn select_pending(
    all: &[String],
    executed: &[LedgerEntry],
    target: Option<&str>,
) -> MigrationResult<Vec<String>> {
    let executed: HashSet<&str> = executed.iter().map(|e| e.filename.as_str()).collect();
    let mut pending: Vec<String> = all
        .iter()
        .filter(|f| !executed.contains(f.as_str()))
        .cloned()
        .collect();

    if let Some(target) = target {
        let position = pending
            .iter()
            .position(|f| f == target)
            .ok_or_else(|| MigrationError::TargetNotFound(target.to_string()))?;
        pending.truncate(position + 1);
    }

    Ok(pending)
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
