//! SQLite pool setup, embedded migrations and timestamp encoding.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

const MIGRATION_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Open a pool for `database_url`, creating the database file if needed.
///
/// In-memory databases are pinned to a single long-lived connection so every
/// query sees the same schema.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database url `{}`", database_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let in_memory = database_url.contains(":memory:");
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to `{}`", database_url))?;
    Ok(pool)
}

/// Run the embedded schema, one statement at a time.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = MIGRATION_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt)
            .execute(db)
            .await
            .with_context(|| format!("executing migration statement `{}`", stmt))?;
    }

    Ok(())
}

/// Fixed-width UTC encoding; lexical order equals chronological order.
pub fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = connect("sqlite::memory:").await.expect("in-memory pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}
