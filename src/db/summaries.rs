//! Session summary database queries.
//!
//! No uniqueness constraint on session_id: one summary per prompt-response
//! cycle accumulates over a session's life.

use sqlx::{FromRow, QueryBuilder, Sqlite};

use crate::error::Result;
use crate::models::{SessionSummary, SummaryDraft};

use super::{now_pair, DateOrder, DbPool};

#[derive(Debug, FromRow)]
struct SummaryRow {
    id: i64,
    session_id: String,
    project: String,
    request: Option<String>,
    investigated: Option<String>,
    learned: Option<String>,
    completed: Option<String>,
    next_steps: Option<String>,
    notes: Option<String>,
    files_read: String,
    files_edited: String,
    prompt_number: i64,
    created_at: String,
    created_at_epoch: i64,
}

impl From<SummaryRow> for SessionSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            project: row.project,
            request: row.request,
            investigated: row.investigated,
            learned: row.learned,
            completed: row.completed,
            next_steps: row.next_steps,
            notes: row.notes,
            files_read: serde_json::from_str(&row.files_read).unwrap_or_default(),
            files_edited: serde_json::from_str(&row.files_edited).unwrap_or_default(),
            prompt_number: row.prompt_number,
            created_at: row.created_at,
            created_at_epoch: row.created_at_epoch,
        }
    }
}

const SUMMARY_COLUMNS: &str = "id, session_id, project, request, investigated, learned, \
     completed, next_steps, notes, files_read, files_edited, prompt_number, \
     created_at, created_at_epoch";

/// Store a new session summary. Auto-creates a minimal session row when
/// session bookkeeping lags behind, same as observation ingestion.
pub async fn store_summary(
    pool: &DbPool,
    session_external_id: &str,
    project: &str,
    draft: SummaryDraft,
    prompt_number: i64,
) -> Result<SessionSummary> {
    super::create_session(pool, session_external_id, project, "").await?;

    let (created_at, created_at_epoch) = now_pair();

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO session_summaries (
            session_id, project, request, investigated, learned, completed,
            next_steps, notes, files_read, files_edited, prompt_number,
            created_at, created_at_epoch
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(session_external_id)
    .bind(project)
    .bind(&draft.request)
    .bind(&draft.investigated)
    .bind(&draft.learned)
    .bind(&draft.completed)
    .bind(&draft.next_steps)
    .bind(&draft.notes)
    .bind(serde_json::to_string(&draft.files_read)?)
    .bind(serde_json::to_string(&draft.files_edited)?)
    .bind(prompt_number)
    .bind(&created_at)
    .bind(created_at_epoch)
    .fetch_one(pool)
    .await?;

    Ok(SessionSummary {
        id,
        session_id: session_external_id.to_string(),
        project: project.to_string(),
        request: draft.request,
        investigated: draft.investigated,
        learned: draft.learned,
        completed: draft.completed,
        next_steps: draft.next_steps,
        notes: draft.notes,
        files_read: draft.files_read,
        files_edited: draft.files_edited,
        prompt_number,
        created_at,
        created_at_epoch,
    })
}

/// Get a summary by id.
pub async fn get_summary(pool: &DbPool, id: i64) -> Result<Option<SessionSummary>> {
    let row: Option<SummaryRow> = sqlx::query_as(&format!(
        "SELECT {} FROM session_summaries WHERE id = ?",
        SUMMARY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Batch lookup by id; empty input executes no query.
pub async fn get_summaries_by_ids(
    pool: &DbPool,
    ids: &[i64],
    order: Option<DateOrder>,
) -> Result<Vec<SessionSummary>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM session_summaries WHERE id IN (",
        SUMMARY_COLUMNS
    ));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    qb.push(")");
    if let Some(order) = order {
        let dir = match order {
            DateOrder::Asc => "ASC",
            DateOrder::Desc => "DESC",
        };
        qb.push(format!(" ORDER BY created_at_epoch {}, id {}", dir, dir));
    }

    let rows: Vec<SummaryRow> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// The most recent summary for a session, used to resolve session anchors.
pub async fn latest_summary_for_session(
    pool: &DbPool,
    session_external_id: &str,
) -> Result<Option<SessionSummary>> {
    let row: Option<SummaryRow> = sqlx::query_as(&format!(
        "SELECT {} FROM session_summaries WHERE session_id = ? \
         ORDER BY created_at_epoch DESC, id DESC LIMIT 1",
        SUMMARY_COLUMNS
    ))
    .bind(session_external_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// List summaries by project/date filters, ordered by date.
pub async fn list_summaries(
    pool: &DbPool,
    project: Option<&str>,
    date_start_epoch: Option<i64>,
    date_end_epoch: Option<i64>,
    order: DateOrder,
    limit: usize,
    offset: usize,
) -> Result<Vec<SessionSummary>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM session_summaries WHERE 1=1",
        SUMMARY_COLUMNS
    ));
    if let Some(project) = project {
        qb.push(" AND project = ").push_bind(project.to_string());
    }
    if let Some(start) = date_start_epoch {
        qb.push(" AND created_at_epoch >= ").push_bind(start);
    }
    if let Some(end) = date_end_epoch {
        qb.push(" AND created_at_epoch <= ").push_bind(end);
    }
    let dir = match order {
        DateOrder::Asc => "ASC",
        DateOrder::Desc => "DESC",
    };
    qb.push(format!(" ORDER BY created_at_epoch {}, id {}", dir, dir));
    qb.push(" LIMIT ").push_bind(limit as i64);
    qb.push(" OFFSET ").push_bind(offset as i64);

    let rows: Vec<SummaryRow> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// All summaries whose epoch falls in the closed interval [start, end].
pub async fn summaries_between(
    pool: &DbPool,
    start_epoch: i64,
    end_epoch: i64,
    project: Option<&str>,
) -> Result<Vec<SessionSummary>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM session_summaries WHERE created_at_epoch >= ",
        SUMMARY_COLUMNS
    ));
    qb.push_bind(start_epoch);
    qb.push(" AND created_at_epoch <= ").push_bind(end_epoch);
    if let Some(project) = project {
        qb.push(" AND project = ").push_bind(project.to_string());
    }
    qb.push(" ORDER BY created_at_epoch ASC, id ASC");

    let rows: Vec<SummaryRow> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Stream a batch of summaries ordered by id, for backfill.
pub async fn summaries_page(
    pool: &DbPool,
    after_id: i64,
    batch_size: usize,
) -> Result<Vec<SessionSummary>> {
    let rows: Vec<SummaryRow> = sqlx::query_as(&format!(
        "SELECT {} FROM session_summaries WHERE id > ? ORDER BY id ASC LIMIT ?",
        SUMMARY_COLUMNS
    ))
    .bind(after_id)
    .bind(batch_size as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
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

    fn draft() -> SummaryDraft {
        SummaryDraft {
            request: Some("Investigate flaky test".to_string()),
            learned: Some("The test depends on wall-clock time".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_store_and_get_summary() {
        let pool = setup().await;

        let summary = store_summary(&pool, "s-1", "demo", draft(), 1).await.unwrap();
        assert!(summary.id > 0);

        let fetched = get_summary(&pool, summary.id).await.unwrap().unwrap();
        assert_eq!(fetched.request.as_deref(), Some("Investigate flaky test"));
    }

    #[tokio::test]
    async fn test_multiple_summaries_per_session() {
        let pool = setup().await;

        for n in 1..=3 {
            store_summary(&pool, "s-multi", "demo", draft(), n).await.unwrap();
        }

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM session_summaries WHERE session_id = 's-multi'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 3);

        let latest = latest_summary_for_session(&pool, "s-multi")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.prompt_number, 3);
    }

    #[tokio::test]
    async fn test_get_summaries_by_ids_empty() {
        let pool = setup().await;
        let results = get_summaries_by_ids(&pool, &[], None).await.unwrap();
        assert!(results.is_empty());
    }
}
