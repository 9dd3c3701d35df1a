use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    sqlite::SqlitePoolOptions,
    ColumnIndex, Decode, PgPool, Row, SqlitePool, Type,
};
use thiserror::Error;

use bootgate_core::LedgerEntry;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Discrete PostgreSQL connection settings.
#[derive(Clone, Copy)]
pub struct PostgresTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub user: &'a str,
    pub password: &'a str,
    pub database: &'a str,
}

#[derive(Clone)]
enum Pool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Top-level database handle used to inspect the target database.
///
/// The bootstrapper only reads; schema changes go through the framework's
/// own migrate command.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Connects using a `postgres://` or `sqlite:` connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = if database_url.starts_with("postgres://")
            || database_url.starts_with("postgresql://")
        {
            Pool::Postgres(
                PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect(database_url)
                    .await
                    .map_err(StorageError::Connect)?,
            )
        } else if database_url.starts_with("sqlite:") {
            Pool::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect(database_url)
                    .await
                    .map_err(StorageError::Connect)?,
            )
        } else {
            return Err(StorageError::UnsupportedUrl(redact_url(database_url)));
        };

        Ok(Self { pool })
    }

    /// Connects to PostgreSQL from discrete settings, avoiding URL escaping
    /// of credentials.
    pub async fn connect_postgres(target: PostgresTarget<'_>) -> Result<Self, StorageError> {
        let options = PgConnectOptions::new()
            .host(target.host)
            .port(target.port)
            .username(target.user)
            .password(target.password)
            .database(target.database);
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;
        Ok(Self {
            pool: Pool::Postgres(pool),
        })
    }

    /// Returns a handle to read the framework's migration ledger table.
    ///
    /// `table` must already be validated as a plain identifier.
    pub fn migration_ledger(&self, table: impl Into<String>) -> LedgerRepository {
        LedgerRepository {
            pool: self.pool.clone(),
            table: table.into(),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self.pool {
            Pool::Postgres(_) => "postgres",
            Pool::Sqlite(_) => "sqlite",
        }
    }

    pub async fn close(&self) {
        match &self.pool {
            Pool::Postgres(pool) => pool.close().await,
            Pool::Sqlite(pool) => pool.close().await,
        }
    }

    #[cfg(test)]
    fn sqlite_pool(&self) -> &SqlitePool {
        match &self.pool {
            Pool::Sqlite(pool) => pool,
            Pool::Postgres(_) => panic!("test database is sqlite"),
        }
    }
}

fn redact_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, _)) => format!("{scheme}://…"),
        None => url.chars().take(16).collect(),
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to database: {0}")]
    Connect(sqlx::Error),
    #[error("unsupported database url {0} (expected postgres:// or sqlite:)")]
    UnsupportedUrl(String),
    #[error("failed to read migration ledger {table}: {source}")]
    Ledger { table: String, source: sqlx::Error },
}

/// Repository over the migration-tracking table (`app`, `name`, `applied`).
#[derive(Clone)]
pub struct LedgerRepository {
    pool: Pool,
    table: String,
}

impl LedgerRepository {
    /// Returns `true` when the ledger table exists.
    pub async fn table_exists(&self) -> Result<bool, StorageError> {
        let result = match &self.pool {
            Pool::Postgres(pool) => {
                sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
                    .bind(&self.table)
                    .fetch_one(pool)
                    .await
            }
            Pool::Sqlite(pool) => sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(&self.table)
            .fetch_one(pool)
            .await
            .map(|count| count > 0),
        };
        result.map_err(|source| self.error(source))
    }

    /// Loads every recorded migration, oldest first.
    ///
    /// A database the framework has never touched has no ledger table; that
    /// reads as an empty ledger.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>, StorageError> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT app, name, applied FROM {} ORDER BY applied, app, name",
            self.table
        );
        let result: Result<Vec<LedgerEntry>, sqlx::Error> = match &self.pool {
            Pool::Postgres(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .and_then(|rows| rows.iter().map(entry_from_row).collect()),
            Pool::Sqlite(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .and_then(|rows| rows.iter().map(entry_from_row).collect()),
        };
        result.map_err(|source| self.error(source))
    }

    fn error(&self, source: sqlx::Error) -> StorageError {
        StorageError::Ledger {
            table: self.table.clone(),
            source,
        }
    }
}

fn entry_from_row<'r, R>(row: &'r R) -> Result<LedgerEntry, sqlx::Error>
where
    R: Row,
    &'static str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    Option<DateTime<Utc>>: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(LedgerEntry {
        app: row.try_get("app")?,
        name: row.try_get("name")?,
        applied: row.try_get("applied")?,
    })
}
