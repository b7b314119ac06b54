//! Database layer for Recall.
//!
//! Provides SQLite connection pooling and query modules
//! for all stored record types.

mod fts;
mod migrations;
mod observations;
mod prompts;
mod sessions;
mod summaries;

pub use fts::*;
pub use migrations::*;
pub use observations::*;
pub use prompts::*;
pub use sessions::*;
pub use summaries::*;

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Type alias for the SQLite connection pool.
pub type DbPool = sqlx::SqlitePool;

/// Initialize the database connection pool.
///
/// Creates parent directories if needed and configures SQLite with
/// settings for concurrent access (WAL journal, busy timeout).
pub async fn init_pool(path: &str) -> Result<DbPool> {
    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::from_str(path)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30))
        .foreign_keys(true)
        // Increase cache size (negative = KB)
        .pragma("cache_size", "-64000")
        // Temp store in memory
        .pragma("temp_store", "memory");

    // A :memory: database exists per connection; cap the pool at one so
    // every query sees the same schema.
    let max_connections = if path.contains(":memory:") { 1 } else { 10 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect_with(options)
        .await?;

    info!("Database pool initialized: {}", path);

    Ok(pool)
}

/// Initialize the base schema, then apply versioned migrations.
///
/// The base schema uses IF NOT EXISTS clauses so it is safe to run on every
/// startup; migrations are ledgered in schema_migrations (see migrations.rs).
pub async fn initialize_schema(pool: &DbPool) -> Result<()> {
    let schema = include_str!("../../schema.sql");

    info!("Initializing database schema");

    // Execute schema SQL statement by statement, skipping comment lines
    for statement in schema.split(';') {
        let clean_stmt: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let clean_stmt = clean_stmt.trim();
        if clean_stmt.is_empty() {
            continue;
        }
        sqlx::query(clean_stmt).execute(pool).await?;
    }

    apply_migrations(pool).await?;

    info!("Database schema initialized successfully");

    Ok(())
}

/// Current epoch milliseconds plus the matching RFC 3339 form.
///
/// The epoch form is the sole ordering/windowing key everywhere; the
/// RFC 3339 string exists for humans.
pub fn now_pair() -> (String, i64) {
    let now = chrono::Utc::now();
    (now.to_rfc3339(), now.timestamp_millis())
}

/// Row counts per record table, for the status endpoint and backfill
/// divergence checks.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct TableCounts {
    pub sessions: i64,
    pub observations: i64,
    pub summaries: i64,
    pub prompts: i64,
}

pub async fn table_counts(pool: &DbPool) -> Result<TableCounts> {
    let (sessions,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
        .fetch_one(pool)
        .await?;
    let (observations,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM observations")
        .fetch_one(pool)
        .await?;
    let (summaries,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM session_summaries")
        .fetch_one(pool)
        .await?;
    let (prompts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_prompts")
        .fetch_one(pool)
        .await?;

    Ok(TableCounts {
        sessions,
        observations,
        summaries,
        prompts,
    })
}
