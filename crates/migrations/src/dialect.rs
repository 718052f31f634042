//! SQL dialect differences that matter to the ledger

use crate::error::{MigrationError, MigrationResult};

/// Database dialect, derived from the connection URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Detect the dialect from a connection URL scheme
    pub fn from_url(url: &str) -> MigrationResult<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(MigrationError::Configuration(format!(
                "Unsupported database URL scheme '{}': expected postgres:// or sqlite:",
                scheme
            ))),
        }
    }

    /// Bind placeholder for the 1-based parameter `index`
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    /// SQL to create the ledger table if it is missing
    pub fn create_ledger_table_sql(self, table: &str) -> String {
        let id_column = match self {
            Dialect::Postgres => "id BIGSERIAL PRIMARY KEY",
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        };

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                {},\n    \
                filename VARCHAR(255) NOT NULL UNIQUE,\n    \
                executed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
                execution_time BIGINT NOT NULL,\n    \
                checksum VARCHAR(64) NOT NULL\n\
            )",
            table, id_column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://pos@localhost/pos").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("postgresql://localhost/pos").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert_eq!(
            Dialect::from_url("sqlite:///var/lib/pos.db?mode=rwc").unwrap(),
            Dialect::Sqlite
        );
        assert!(matches!(
            Dialect::from_url("mysql://localhost/pos"),
            Err(MigrationError::Configuration(_))
        ));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::Sqlite.placeholder(2), "?");
    }

    #[test]
    fn test_ledger_table_sql() {
        let sql = Dialect::Postgres.create_ledger_table_sql("migrations");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS migrations"));
        assert!(sql.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(sql.contains("filename VARCHAR(255) NOT NULL UNIQUE"));
        assert!(sql.contains("checksum VARCHAR(64) NOT NULL"));

        let sql = Dialect::Sqlite.create_ledger_table_sql("schema_ledger");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS schema_ledger"));
        assert!(sql.contains("INTEGER PRIMARY KEY AUTOINCREMENT"));
    }
}
