//! Migration Rollback - Undoes applied migrations
//!
//! Rollback selects the newest ledger entries and runs their down sections
//! newest first, the exact inverse of the order they were applied in.

use sqlx::AnyConnection;

use crate::definitions::{LedgerEntry, MigrationDirection, RollbackResult};
use crate::error::{MigrationError, MigrationResult};
use crate::runner::MigrationRunner;

impl MigrationRunner {
    /// Roll back the last `steps` applied migrations
    pub async fn down(&self, steps: usize) -> MigrationResult<RollbackResult> {
        if steps == 0 {
            return Err(MigrationError::InvalidArgument(
                "rollback steps must be at least 1".to_string(),
            ));
        }
        self.rollback(Some(steps)).await
    }

    /// Roll back every applied migration
    pub async fn reset(&self) -> MigrationResult<RollbackResult> {
        self.rollback(None).await
    }

    async fn rollback(&self, steps: Option<usize>) -> MigrationResult<RollbackResult> {
        let mut conn = self.connect().await?;
        let result = self.rollback_executed(&mut conn, steps).await;
        self.disconnect(conn).await;
        result
    }

    async fn rollback_executed(
        &self,
        conn: &mut AnyConnection,
        steps: Option<usize>,
    ) -> MigrationResult<RollbackResult> {
        let executed = self.tracker().get_executed_migrations(conn).await?;
        let batch = select_rollback(&executed, steps);

        if batch.is_empty() {
            tracing::info!("No migrations to roll back");
            return Ok(RollbackResult::empty());
        }

        tracing::info!(count = batch.len(), "Rolling back migrations");
        let outcomes = self.run_batch(conn, &batch, MigrationDirection::Down).await;
        Ok(RollbackResult::from_outcomes(outcomes))
    }
}

/// The newest `steps` ledger entries, newest first; all of them when `steps` is `None`.
///
/// `executed` must be ordered by filename ascending, as the tracker returns it.
pub fn select_rollback(executed: &[LedgerEntry], steps: Option<usize>) -> Vec<String> {
    let count = steps.unwrap_or(executed.len()).min(executed.len());
    executed
        .iter()
        .rev()
        .take(count)
        .map(|e| e.filename.clone())
        .collect()
}
