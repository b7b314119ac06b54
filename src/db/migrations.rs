//! Versioned schema migrations.
//!
//! The base schema (schema.sql) is additive and idempotent on its own;
//! everything that needs ordering or a destructive rebuild goes through the
//! ledger here. Each migration runs inside one transaction and its version
//! is recorded in schema_migrations within that same transaction, so a
//! failed step leaves neither half-applied DDL nor a bogus ledger entry.
//! Steps also guard on the actual schema state (column/index existence) so
//! concurrent worker startups or re-runs never double-apply.

use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::DbPool;

/// Ordered migration list. Append only; never renumber.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, "sessions_processing_session_id"),
    (2, "session_summaries_allow_multiple"),
    (3, "record_fts"),
];

/// Apply all unapplied migrations in order.
pub async fn apply_migrations(pool: &DbPool) -> Result<()> {
    for &(version, name) in MIGRATIONS {
        let applied: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(version)
                .fetch_optional(pool)
                .await?;

        if applied.is_some() {
            debug!(version, name, "Migration already applied");
            continue;
        }

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| Error::Migration(format!("{}: begin failed: {}", name, e)))?;

        let result = match version {
            1 => migrate_processing_session_id(&mut tx).await,
            2 => migrate_relax_summary_uniqueness(&mut tx).await,
            3 => migrate_record_fts(&mut tx).await,
            _ => Err(Error::Migration(format!("unknown migration version {}", version))),
        };

        if let Err(e) = result {
            // Roll back so the ledger never records a half-applied step
            let _ = tx.rollback().await;
            return Err(Error::Migration(format!("{}: {}", name, e)));
        }

        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(version)
            .bind(name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Migration(format!("{}: ledger write failed: {}", name, e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Migration(format!("{}: commit failed: {}", name, e)))?;

        info!(version, name, "Applied migration");
    }

    Ok(())
}

/// v1: add sessions.processing_session_id for databases created before the
/// column existed. Secondary guard: skip if the column is already present.
async fn migrate_processing_session_id(tx: &mut SqliteConnection) -> Result<()> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM pragma_table_info('sessions') WHERE name = 'processing_session_id'",
    )
    .fetch_one(&mut *tx)
    .await?;

    if count > 0 {
        return Ok(());
    }

    sqlx::query("ALTER TABLE sessions ADD COLUMN processing_session_id TEXT")
        .execute(&mut *tx)
        .await?;

    Ok(())
}

/// v2: drop the historical UNIQUE constraint on session_summaries.session_id
/// (a session accumulates one summary per prompt).
///
/// UNIQUE lives in the table DDL on legacy databases, so this is the
/// shadow-table dance: create the new shape, copy rows, drop the original,
/// rename, recreate indices. The surrounding transaction rolls the whole
/// thing back if any step fails.
async fn migrate_relax_summary_uniqueness(tx: &mut SqliteConnection) -> Result<()> {
    let (unique_count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM pragma_index_list('session_summaries') il, pragma_index_info(il.name) ii
        WHERE il."unique" = 1 AND ii.name = 'session_id'
        "#,
    )
    .fetch_one(&mut *tx)
    .await?;

    if unique_count == 0 {
        return Ok(());
    }

    sqlx::query(
        r#"
        CREATE TABLE session_summaries_new (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            project TEXT NOT NULL DEFAULT '',
            request TEXT,
            investigated TEXT,
            learned TEXT,
            completed TEXT,
            next_steps TEXT,
            notes TEXT,
            files_read TEXT NOT NULL DEFAULT '[]',
            files_edited TEXT NOT NULL DEFAULT '[]',
            prompt_number INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO session_summaries_new (
            id, session_id, project, request, investigated, learned,
            completed, next_steps, notes, files_read, files_edited,
            prompt_number, created_at, created_at_epoch
        )
        SELECT id, session_id, project, request, investigated, learned,
               completed, next_steps, notes, files_read, files_edited,
               prompt_number, created_at, created_at_epoch
        FROM session_summaries
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("DROP TABLE session_summaries")
        .execute(&mut *tx)
        .await?;

    sqlx::query("ALTER TABLE session_summaries_new RENAME TO session_summaries")
        .execute(&mut *tx)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_summaries_session ON session_summaries(session_id)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_summaries_epoch ON session_summaries(created_at_epoch)")
        .execute(&mut *tx)
        .await?;

    Ok(())
}

/// v3: full-text index over record text, maintained by insert triggers.
/// Records are immutable after insert, so insert triggers are the whole
/// maintenance story (see db::fts for the query side and rebuild).
async fn migrate_record_fts(tx: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS record_fts USING fts5(
            title,
            body,
            doc_type UNINDEXED,
            source_id UNINDEXED,
            project UNINDEXED
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS observations_fts_insert
        AFTER INSERT ON observations
        BEGIN
            INSERT INTO record_fts (title, body, doc_type, source_id, project)
            VALUES (
                new.title,
                COALESCE(new.subtitle, '') || ' ' || COALESCE(new.narrative, '') || ' ' || new.facts,
                'observation',
                new.id,
                new.project
            );
        END
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS summaries_fts_insert
        AFTER INSERT ON session_summaries
        BEGIN
            INSERT INTO record_fts (title, body, doc_type, source_id, project)
            VALUES (
                COALESCE(new.request, ''),
                COALESCE(new.investigated, '') || ' ' || COALESCE(new.learned, '') || ' ' ||
                COALESCE(new.completed, '') || ' ' || COALESCE(new.next_steps, '') || ' ' ||
                COALESCE(new.notes, ''),
                'session_summary',
                new.id,
                new.project
            );
        END
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS prompts_fts_insert
        AFTER INSERT ON user_prompts
        BEGIN
            INSERT INTO record_fts (title, body, doc_type, source_id, project)
            VALUES ('', new.text, 'user_prompt', new.id, '');
        END
        "#,
    )
    .execute(&mut *tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};

    #[tokio::test]
    async fn test_migrations_record_ledger() {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let versions: Vec<(i64,)> =
            sqlx::query_as("SELECT version FROM schema_migrations ORDER BY version")
                .fetch_all(&pool)
                .await
                .unwrap();

        let versions: Vec<i64> = versions.into_iter().map(|(v,)| v).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        apply_migrations(&pool).await.unwrap();
        apply_migrations(&pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_summary_uniqueness_rebuild_on_legacy_schema() {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();

        // Recreate the legacy shape: UNIQUE(session_id) in the table DDL.
        sqlx::query("DROP TABLE session_summaries")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE session_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE,
                project TEXT NOT NULL DEFAULT '',
                request TEXT,
                investigated TEXT,
                learned TEXT,
                completed TEXT,
                next_steps TEXT,
                notes TEXT,
                files_read TEXT NOT NULL DEFAULT '[]',
                files_edited TEXT NOT NULL DEFAULT '[]',
                prompt_number INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                created_at_epoch INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO session_summaries (session_id, created_at, created_at_epoch)
             VALUES ('s-1', '2026-01-01T00:00:00Z', 1)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("DELETE FROM schema_migrations WHERE version = 2")
            .execute(&pool)
            .await
            .unwrap();

        apply_migrations(&pool).await.unwrap();

        // Existing row survived the rebuild
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM session_summaries")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        // And a second summary for the same session now inserts cleanly
        sqlx::query(
            "INSERT INTO session_summaries (session_id, created_at, created_at_epoch)
             VALUES ('s-1', '2026-01-01T00:00:01Z', 2)",
        )
        .execute(&pool)
        .await
        .unwrap();
    }
}
