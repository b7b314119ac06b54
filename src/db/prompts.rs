//! User prompt database queries.

use sqlx::{FromRow, QueryBuilder, Sqlite};

use crate::error::Result;
use crate::models::UserPrompt;

use super::{now_pair, DateOrder, DbPool};

#[derive(Debug, FromRow)]
struct PromptRow {
    id: i64,
    session_id: String,
    prompt_number: i64,
    text: String,
    created_at: String,
    created_at_epoch: i64,
}

impl From<PromptRow> for UserPrompt {
    fn from(row: PromptRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            prompt_number: row.prompt_number,
            text: row.text,
            created_at: row.created_at,
            created_at_epoch: row.created_at_epoch,
        }
    }
}

const PROMPT_COLUMNS: &str = "id, session_id, prompt_number, text, created_at, created_at_epoch";

/// Store a user prompt. When the caller does not supply a sequence number,
/// the owning session's prompt counter assigns one.
pub async fn store_prompt(
    pool: &DbPool,
    session_external_id: &str,
    prompt_number: Option<i64>,
    text: &str,
) -> Result<UserPrompt> {
    let prompt_number = match prompt_number {
        Some(n) => {
            super::create_session(pool, session_external_id, "", "").await?;
            n
        }
        None => super::next_prompt_number(pool, session_external_id).await?,
    };

    let (created_at, created_at_epoch) = now_pair();

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO user_prompts (session_id, prompt_number, text, created_at, created_at_epoch)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(session_external_id)
    .bind(prompt_number)
    .bind(text)
    .bind(&created_at)
    .bind(created_at_epoch)
    .fetch_one(pool)
    .await?;

    Ok(UserPrompt {
        id,
        session_id: session_external_id.to_string(),
        prompt_number,
        text: text.to_string(),
        created_at,
        created_at_epoch,
    })
}

/// Get a prompt by id.
pub async fn get_prompt(pool: &DbPool, id: i64) -> Result<Option<UserPrompt>> {
    let row: Option<PromptRow> = sqlx::query_as(&format!(
        "SELECT {} FROM user_prompts WHERE id = ?",
        PROMPT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Batch lookup by id; empty input executes no query.
pub async fn get_prompts_by_ids(
    pool: &DbPool,
    ids: &[i64],
    order: Option<DateOrder>,
) -> Result<Vec<UserPrompt>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM user_prompts WHERE id IN (",
        PROMPT_COLUMNS
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

    let rows: Vec<PromptRow> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// List prompts by date filters, ordered by date. Prompts carry no project
/// field; a project filter restricts via the owning session.
pub async fn list_prompts(
    pool: &DbPool,
    project: Option<&str>,
    date_start_epoch: Option<i64>,
    date_end_epoch: Option<i64>,
    order: DateOrder,
    limit: usize,
    offset: usize,
) -> Result<Vec<UserPrompt>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM user_prompts WHERE 1=1",
        PROMPT_COLUMNS
    ));
    if let Some(project) = project {
        qb.push(
            " AND session_id IN (SELECT session_id FROM sessions WHERE project = ",
        )
        .push_bind(project.to_string())
        .push(")");
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

    let rows: Vec<PromptRow> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// All prompts whose epoch falls in the closed interval [start, end].
pub async fn prompts_between(
    pool: &DbPool,
    start_epoch: i64,
    end_epoch: i64,
    project: Option<&str>,
) -> Result<Vec<UserPrompt>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM user_prompts WHERE created_at_epoch >= ",
        PROMPT_COLUMNS
    ));
    qb.push_bind(start_epoch);
    qb.push(" AND created_at_epoch <= ").push_bind(end_epoch);
    if let Some(project) = project {
        qb.push(
            " AND session_id IN (SELECT session_id FROM sessions WHERE project = ",
        )
        .push_bind(project.to_string())
        .push(")");
    }
    qb.push(" ORDER BY created_at_epoch ASC, id ASC");

    let rows: Vec<PromptRow> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Stream a batch of prompts ordered by id, for backfill.
pub async fn prompts_page(
    pool: &DbPool,
    after_id: i64,
    batch_size: usize,
) -> Result<Vec<UserPrompt>> {
    let rows: Vec<PromptRow> = sqlx::query_as(&format!(
        "SELECT {} FROM user_prompts WHERE id > ? ORDER BY id ASC LIMIT ?",
        PROMPT_COLUMNS
    ))
    .bind(after_id)
    .bind(batch_size as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}
