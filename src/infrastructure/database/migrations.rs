//! Embedded schema migrations.
//!
//! Grounded on the teacher's `adapters/sqlite/migrations.rs`: migrations
//! are embedded at compile time via `include_str!`, tracked in a
//! version table (`engine_migrations`), and applied in order inside a
//! single connection via `sqlx::raw_sql`. Unlike the teacher, which only
//! ever targets SQLite, `run` takes the target `Dialect` and rewrites
//! each migration's DDL before applying it (spec §9).

use sqlx::SqlitePool;

use super::dialect::{rewrite_for, Dialect};
use crate::domain::ports::StoreError;

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        name: "initial_schema",
        sql: include_str!("../../../migrations/001_initial_schema.sql"),
    }]
}

/// Apply every embedded migration newer than the current schema version.
///
/// `dialect` controls DDL rewriting (spec §9); for SQLite this is a
/// no-op pass-through. Idempotent: migrations already recorded in
/// `engine_migrations` are skipped.
pub async fn run(pool: &SqlitePool, dialect: Dialect) -> Result<(), StoreError> {
    ensure_migrations_table(pool).await?;
    let current = current_version(pool).await?;

    for migration in all_embedded_migrations() {
        if migration.version <= current {
            continue;
        }
        apply(pool, dialect, &migration).await?;
    }
    Ok(())
}

async fn ensure_migrations_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS engine_migrations (\
            version INTEGER PRIMARY KEY, \
            name TEXT NOT NULL, \
            applied_at TEXT NOT NULL\
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::Migration(e.to_string()))?;
    Ok(())
}

async fn current_version(pool: &SqlitePool) -> Result<i64, StoreError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM engine_migrations")
        .fetch_optional(pool)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;
    Ok(row.map(|(v,)| v).unwrap_or(0))
}

async fn apply(pool: &SqlitePool, dialect: Dialect, migration: &Migration) -> Result<(), StoreError> {
    let ddl = rewrite_for(dialect, migration.sql);
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    sqlx::raw_sql(&ddl)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Migration(format!("{}: {e}", migration.name)))?;

    sqlx::query("INSERT INTO engine_migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;
    Ok(())
}
