//! Session database queries.
//!
//! Session creation is idempotent per external id: the uniqueness
//! constraint plus an upsert resolves concurrent duplicate creation inside
//! SQLite instead of a check-then-insert race.

use sqlx::FromRow;

use crate::error::Result;
use crate::models::{Session, SessionStatus};

use super::{now_pair, DbPool};

#[derive(Debug, FromRow)]
struct SessionRow {
    id: i64,
    session_id: String,
    processing_session_id: Option<String>,
    project: String,
    request: String,
    status: String,
    prompt_count: i64,
    created_at: String,
    created_at_epoch: i64,
    completed_at: Option<String>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            processing_session_id: row.processing_session_id,
            project: row.project,
            request: row.request,
            // The CHECK constraint keeps this in range; default defensively
            status: SessionStatus::from_str(&row.status).unwrap_or_default(),
            prompt_count: row.prompt_count,
            created_at: row.created_at,
            created_at_epoch: row.created_at_epoch,
            completed_at: row.completed_at,
        }
    }
}

const SESSION_COLUMNS: &str = "id, session_id, processing_session_id, project, request, \
     status, prompt_count, created_at, created_at_epoch, completed_at";

/// Create a session, or return the existing internal id for this external
/// id. Non-empty project/request values fill in placeholders left by an
/// earlier race; they never overwrite real values.
pub async fn create_session(
    pool: &DbPool,
    external_id: &str,
    project: &str,
    request: &str,
) -> Result<i64> {
    let (created_at, created_at_epoch) = now_pair();

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO sessions (session_id, project, request, status, prompt_count, created_at, created_at_epoch)
        VALUES (?, ?, ?, 'active', 0, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            project = CASE
                WHEN excluded.project <> '' AND sessions.project = '' THEN excluded.project
                ELSE sessions.project
            END,
            request = CASE
                WHEN excluded.request <> '' AND sessions.request = '' THEN excluded.request
                ELSE sessions.request
            END
        RETURNING id
        "#,
    )
    .bind(external_id)
    .bind(project)
    .bind(request)
    .bind(&created_at)
    .bind(created_at_epoch)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Get a session by internal numeric id.
pub async fn get_session(pool: &DbPool, id: i64) -> Result<Option<Session>> {
    let row: Option<SessionRow> = sqlx::query_as(&format!(
        "SELECT {} FROM sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Get a session by external identifier.
pub async fn get_session_by_external_id(
    pool: &DbPool,
    external_id: &str,
) -> Result<Option<Session>> {
    let row: Option<SessionRow> = sqlx::query_as(&format!(
        "SELECT {} FROM sessions WHERE session_id = ?",
        SESSION_COLUMNS
    ))
    .bind(external_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Record the processing-session identifier assigned once background
/// processing starts. Overwrites are allowed; the field is bookkeeping.
pub async fn attach_processing_session(
    pool: &DbPool,
    external_id: &str,
    processing_session_id: &str,
) -> Result<bool> {
    let result = sqlx::query("UPDATE sessions SET processing_session_id = ? WHERE session_id = ?")
        .bind(processing_session_id)
        .bind(external_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Transition a session to a terminal status. Happens at most once: a
/// session already completed or failed is left untouched.
pub async fn complete_session(
    pool: &DbPool,
    external_id: &str,
    status: SessionStatus,
) -> Result<bool> {
    if status == SessionStatus::Active {
        return Ok(false);
    }

    let result = sqlx::query(
        "UPDATE sessions SET status = ?, completed_at = ? WHERE session_id = ? AND status = 'active'",
    )
    .bind(status.as_str())
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(external_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Increment and return the session's prompt counter. Auto-creates a
/// minimal session row when prompt capture outruns session bookkeeping.
pub async fn next_prompt_number(pool: &DbPool, external_id: &str) -> Result<i64> {
    create_session(pool, external_id, "", "").await?;

    let (number,): (i64,) = sqlx::query_as(
        "UPDATE sessions SET prompt_count = prompt_count + 1 WHERE session_id = ? RETURNING prompt_count",
    )
    .bind(external_id)
    .fetch_one(pool)
    .await?;

    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};

    async fn setup() -> DbPool {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_create_session_idempotent() {
        let pool = setup().await;

        let first = create_session(&pool, "s-ext-1", "demo", "fix the build").await.unwrap();
        let second = create_session(&pool, "s-ext-1", "demo", "fix the build").await.unwrap();
        assert_eq!(first, second);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_create_session_fills_placeholders_only() {
        let pool = setup().await;

        // First writer raced in with empty placeholders
        let id = create_session(&pool, "s-ext-2", "", "").await.unwrap();

        // Second call supplies real values: they land
        let same = create_session(&pool, "s-ext-2", "demo", "add caching").await.unwrap();
        assert_eq!(id, same);

        let session = get_session_by_external_id(&pool, "s-ext-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.project, "demo");
        assert_eq!(session.request, "add caching");

        // Third call cannot overwrite real values
        create_session(&pool, "s-ext-2", "other", "different").await.unwrap();
        let session = get_session_by_external_id(&pool, "s-ext-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.project, "demo");
        assert_eq!(session.request, "add caching");
    }

    #[tokio::test]
    async fn test_create_session_concurrent_duplicates() {
        let pool = setup().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                create_session(&pool, "s-race", "demo", "race").await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_session_transitions_once() {
        let pool = setup().await;
        create_session(&pool, "s-done", "demo", "task").await.unwrap();

        assert!(complete_session(&pool, "s-done", SessionStatus::Completed)
            .await
            .unwrap());
        // Second transition is a no-op
        assert!(!complete_session(&pool, "s-done", SessionStatus::Failed)
            .await
            .unwrap());

        let session = get_session_by_external_id(&pool, "s-done")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_next_prompt_number_increments() {
        let pool = setup().await;

        // No session yet: auto-created
        assert_eq!(next_prompt_number(&pool, "s-p").await.unwrap(), 1);
        assert_eq!(next_prompt_number(&pool, "s-p").await.unwrap(), 2);
        assert_eq!(next_prompt_number(&pool, "s-p").await.unwrap(), 3);
    }
}
