//! SQLite connection pool setup.
//!
//! Grounded on the teacher's `infrastructure/database/connection.rs`:
//! WAL journal mode, NORMAL synchronous, foreign keys on, a short busy
//! timeout so writers back off instead of racing, and bounded pool
//! sizing so a single process never starves the OS file descriptor
//! table.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use super::dialect::Dialect;
use super::migrations;
use crate::domain::ports::StoreError;

const MIN_CONNECTIONS: u32 = 5;
const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LIFETIME: Duration = Duration::from_secs(1800);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DatabaseConnection {
    pub pool: SqlitePool,
}

impl DatabaseConnection {
    /// Open (creating if needed) the SQLite database at `path` and run
    /// any pending migrations. `path` may be `:memory:` for tests.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| StoreError::Query(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .min_connections(MIN_CONNECTIONS)
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .max_lifetime(MAX_LIFETIME)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        migrations::run(&pool, Dialect::Sqlite).await?;

        Ok(Self { pool })
    }

    /// In-memory pool for tests: one connection only, since `:memory:`
    /// databases are connection-local in SQLite.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Query(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        migrations::run(&pool, Dialect::Sqlite).await?;
        Ok(Self { pool })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_connection_runs_migrations() {
        let conn = DatabaseConnection::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM organizations")
            .fetch_one(&conn.pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
