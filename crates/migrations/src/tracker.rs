//! Migration Tracker - Persistent ledger of applied migrations
//!
//! Every operation takes the connection it should run on, so ledger writes
//! can share the transaction of the migration they describe.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Row};

use crate::definitions::LedgerEntry;
use crate::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};

/// Reads and writes the ledger table
#[derive(Debug, Clone)]
pub struct MigrationTracker {
    table: String,
    dialect: Dialect,
}

impl MigrationTracker {
    /// Create a tracker for `table`; the name must already be a validated identifier
    pub fn new(table: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            table: table.into(),
            dialect,
        }
    }

    /// Ledger table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the ledger table if it does not exist yet
    pub async fn ensure_ledger_table(&self, conn: &mut AnyConnection) -> MigrationResult<()> {
        let sql = self.dialect.create_ledger_table_sql(&self.table);
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }

    /// All ledger rows, ordered by filename
    pub async fn get_executed_migrations(
        &self,
        conn: &mut AnyConnection,
    ) -> MigrationResult<Vec<LedgerEntry>> {
        self.ensure_ledger_table(conn).await?;

        let sql = format!("{} ORDER BY filename ASC", self.select_entries_sql());
        let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Insert a ledger row.
    ///
    /// Fails on the unique constraint if `filename` is already recorded.
    pub async fn record_migration(
        &self,
        conn: &mut AnyConnection,
        filename: &str,
        execution_time_ms: i64,
        checksum: &str,
    ) -> MigrationResult<()> {
        self.ensure_ledger_table(conn).await?;

        let sql = format!(
            "INSERT INTO {} (filename, execution_time, checksum) VALUES ({}, {}, {})",
            self.table,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
        );
        sqlx::query(&sql)
            .bind(filename)
            .bind(execution_time_ms)
            .bind(checksum)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Delete the ledger row for `filename`; returns the number of rows removed
    pub async fn remove_migration(
        &self,
        conn: &mut AnyConnection,
        filename: &str,
    ) -> MigrationResult<u64> {
        self.ensure_ledger_table(conn).await?;

        let sql = format!(
            "DELETE FROM {} WHERE filename = {}",
            self.table,
            self.dialect.placeholder(1)
        );
        let result = sqlx::query(&sql)
            .bind(filename)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Check whether `filename` is recorded in the ledger
    pub async fn is_migration_executed(
        &self,
        conn: &mut AnyConnection,
        filename: &str,
    ) -> MigrationResult<bool> {
        self.ensure_ledger_table(conn).await?;

        let sql = format!(
            "SELECT filename FROM {} WHERE filename = {}",
            self.table,
            self.dialect.placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(filename)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// The ledger row with the highest filename, if any
    pub async fn get_last_executed_migration(
        &self,
        conn: &mut AnyConnection,
    ) -> MigrationResult<Option<LedgerEntry>> {
        self.ensure_ledger_table(conn).await?;

        let sql = format!("{} ORDER BY filename DESC LIMIT 1", self.select_entries_sql());
        let row = sqlx::query(&sql).fetch_optional(&mut *conn).await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    // Text casts keep decoding within what the Any driver supports on both backends.
    fn select_entries_sql(&self) -> String {
        format!(
            "SELECT CAST(filename AS TEXT) AS filename, \
                    CAST(executed_at AS TEXT) AS executed_at, \
                    execution_time, \
                    CAST(checksum AS TEXT) AS checksum \
             FROM {}",
            self.table
        )
    }
}

fn entry_from_row(row: &AnyRow) -> MigrationResult<LedgerEntry> {
    let executed_at: String = row.try_get("executed_at")?;

    Ok(LedgerEntry {
        filename: row.try_get("filename")?,
        executed_at: parse_timestamp(&executed_at)?,
        execution_time_ms: row.try_get("execution_time")?,
        checksum: row.try_get("checksum")?,
    })
}

/// Parse a timestamp rendered as text by Postgres or SQLite
fn parse_timestamp(value: &str) -> MigrationResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| MigrationError::Ledger(format!("invalid executed_at '{}': {}", value, e)))
}
