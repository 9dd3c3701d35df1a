use std::future::Future;

use bootgate_core::LedgerEntry;
use bootgate_storage::{Database, PostgresTarget, StorageError};
use bootgate_util::DatabaseConfig;
use tracing::debug;

/// Source of the applied-migration records for the target database.
pub trait MigrationLedger {
    fn entries(&self) -> impl Future<Output = Result<Vec<LedgerEntry>, StorageError>>;
}

/// Reads the ledger table over a short-lived connection.
#[derive(Debug, Clone)]
pub struct DatabaseLedger {
    database: DatabaseConfig,
    table: String,
}

impl DatabaseLedger {
    pub fn new(database: DatabaseConfig, table: impl Into<String>) -> Self {
        Self {
            database,
            table: table.into(),
        }
    }

    async fn connect(&self) -> Result<Database, StorageError> {
        match &self.database.url {
            Some(url) => Database::connect(url).await,
            None => {
                Database::connect_postgres(PostgresTarget {
                    host: &self.database.host,
                    port: self.database.port,
                    user: &self.database.user,
                    password: &self.database.password,
                    database: &self.database.name,
                })
                .await
            }
        }
    }
}

impl MigrationLedger for DatabaseLedger {
    async fn entries(&self) -> Result<Vec<LedgerEntry>, StorageError> {
        let database = self.connect().await?;
        debug!(stage = "ledger", backend = database.backend(), table = %self.table, "reading migration ledger");
        let entries = database.migration_ledger(self.table.as_str()).entries().await;
        database.close().await;
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            host: "localhost".into(),
            port: 5432,
            name: "app".into(),
            user: "app".into(),
            password: "app".into(),
            url: url.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn fresh_sqlite_database_has_empty_ledger() {
        let ledger = DatabaseLedger::new(config(Some("sqlite::memory:")), "django_migrations");
        let entries = ledger.entries().await.expect("ledger readable");
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn unsupported_url_is_reported() {
        let ledger = DatabaseLedger::new(config(Some("redis://cache:6379")), "django_migrations");
        let err = ledger.entries().await.expect_err("unsupported url");
        assert!(matches!(err, StorageError::UnsupportedUrl(_)));
    }
}
