//! Observation database queries.
//!
//! Observations are immutable once stored; there is no update path. List
//! fields are JSON-encoded arrays in text columns, decoded here at the
//! store boundary so nothing above this module ever sees raw JSON strings.

use sqlx::{FromRow, QueryBuilder, Sqlite};

use crate::error::{Error, Result};
use crate::models::{Observation, ObservationDraft, ObservationKind};

use super::{now_pair, DbPool};

/// Order key for batch hydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    Asc,
    Desc,
}

impl DateOrder {
    fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, FromRow)]
struct ObservationRow {
    id: i64,
    session_id: String,
    project: String,
    kind: String,
    title: String,
    subtitle: Option<String>,
    facts: String,
    narrative: Option<String>,
    concepts: String,
    files_read: String,
    files_modified: String,
    prompt_number: i64,
    tokens: i64,
    created_at: String,
    created_at_epoch: i64,
}

fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl From<ObservationRow> for Observation {
    fn from(row: ObservationRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            project: row.project,
            // The CHECK constraint keeps this in range
            kind: ObservationKind::from_str(&row.kind).unwrap_or(ObservationKind::Change),
            title: row.title,
            subtitle: row.subtitle,
            facts: decode_list(&row.facts),
            narrative: row.narrative,
            concepts: decode_list(&row.concepts),
            files_read: decode_list(&row.files_read),
            files_modified: decode_list(&row.files_modified),
            prompt_number: row.prompt_number,
            tokens: row.tokens,
            created_at: row.created_at,
            created_at_epoch: row.created_at_epoch,
        }
    }
}

const OBSERVATION_COLUMNS: &str = "id, session_id, project, kind, title, subtitle, facts, \
     narrative, concepts, files_read, files_modified, prompt_number, tokens, \
     created_at, created_at_epoch";

/// Store a new observation.
///
/// Auto-creates a minimal session row when none exists for the external id:
/// observation ingestion must never fail merely because session bookkeeping
/// lags behind. An unknown `kind` is a constraint violation.
pub async fn store_observation(
    pool: &DbPool,
    session_external_id: &str,
    project: &str,
    draft: ObservationDraft,
    prompt_number: i64,
) -> Result<Observation> {
    let kind = ObservationKind::from_str(&draft.kind)
        .ok_or_else(|| Error::Constraint(format!("unknown observation kind: {}", draft.kind)))?;

    // Dependency write first: the session row the observation references
    super::create_session(pool, session_external_id, project, "").await?;

    let (created_at, created_at_epoch) = now_pair();

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO observations (
            session_id, project, kind, title, subtitle, facts, narrative,
            concepts, files_read, files_modified, prompt_number, tokens,
            created_at, created_at_epoch
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(session_external_id)
    .bind(project)
    .bind(kind.as_str())
    .bind(&draft.title)
    .bind(&draft.subtitle)
    .bind(serde_json::to_string(&draft.facts)?)
    .bind(&draft.narrative)
    .bind(serde_json::to_string(&draft.concepts)?)
    .bind(serde_json::to_string(&draft.files_read)?)
    .bind(serde_json::to_string(&draft.files_modified)?)
    .bind(prompt_number)
    .bind(draft.tokens)
    .bind(&created_at)
    .bind(created_at_epoch)
    .fetch_one(pool)
    .await?;

    Ok(Observation {
        id,
        session_id: session_external_id.to_string(),
        project: project.to_string(),
        kind,
        title: draft.title,
        subtitle: draft.subtitle,
        facts: draft.facts,
        narrative: draft.narrative,
        concepts: draft.concepts,
        files_read: draft.files_read,
        files_modified: draft.files_modified,
        prompt_number,
        tokens: draft.tokens,
        created_at,
        created_at_epoch,
    })
}

/// Get an observation by id.
pub async fn get_observation(pool: &DbPool, id: i64) -> Result<Option<Observation>> {
    let row: Option<ObservationRow> = sqlx::query_as(&format!(
        "SELECT {} FROM observations WHERE id = ?",
        OBSERVATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Batch lookup by id. Returns an empty list for empty input without
/// touching the database. `order` sorts by the epoch key; `None` leaves the
/// rows unordered for the caller to re-rank.
pub async fn get_observations_by_ids(
    pool: &DbPool,
    ids: &[i64],
    order: Option<DateOrder>,
) -> Result<Vec<Observation>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM observations WHERE id IN (",
        OBSERVATION_COLUMNS
    ));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    qb.push(")");
    if let Some(order) = order {
        qb.push(format!(" ORDER BY created_at_epoch {}, id {}", order.sql(), order.sql()));
    }

    let rows: Vec<ObservationRow> = qb.build_query_as().fetch_all(pool).await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Structured filters for the filter-only (no query text) search path.
#[derive(Debug, Clone, Default)]
pub struct ObservationFilters {
    pub project: Option<String>,
    pub kind: Option<ObservationKind>,
    pub concept: Option<String>,
    pub file: Option<String>,
    pub date_start_epoch: Option<i64>,
    pub date_end_epoch: Option<i64>,
}

/// List observations matching structured filters, ordered by date.
///
/// This is the only search path that supports date-range filtering; the
/// vector index's metadata predicates do not do range comparisons.
pub async fn list_observations(
    pool: &DbPool,
    filters: &ObservationFilters,
    order: DateOrder,
    limit: usize,
    offset: usize,
) -> Result<Vec<Observation>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM observations WHERE 1=1",
        OBSERVATION_COLUMNS
    ));

    if let Some(project) = &filters.project {
        qb.push(" AND project = ").push_bind(project.clone());
    }
    if let Some(kind) = filters.kind {
        qb.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(concept) = &filters.concept {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(observations.concepts) WHERE json_each.value = ")
            .push_bind(concept.clone())
            .push(")");
    }
    if let Some(file) = &filters.file {
        let pattern = format!("%{}%", file);
        qb.push(" AND (EXISTS (SELECT 1 FROM json_each(observations.files_read) WHERE json_each.value LIKE ")
            .push_bind(pattern.clone())
            .push(") OR EXISTS (SELECT 1 FROM json_each(observations.files_modified) WHERE json_each.value LIKE ")
            .push_bind(pattern)
            .push("))");
    }
    if let Some(start) = filters.date_start_epoch {
        qb.push(" AND created_at_epoch >= ").push_bind(start);
    }
    if let Some(end) = filters.date_end_epoch {
        qb.push(" AND created_at_epoch <= ").push_bind(end);
    }

    qb.push(format!(
        " ORDER BY created_at_epoch {}, id {}",
        order.sql(),
        order.sql()
    ));
    qb.push(" LIMIT ").push_bind(limit as i64);
    qb.push(" OFFSET ").push_bind(offset as i64);

    let rows: Vec<ObservationRow> = qb.build_query_as().fetch_all(pool).await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Epochs of up to `depth + 1` observations at or before the anchor id,
/// newest first. Id order approximates time order and stays stable through
/// sub-millisecond bursts, which is why the timeline uses id offsets here.
pub async fn observation_epochs_before_id(
    pool: &DbPool,
    anchor_id: i64,
    depth: usize,
    project: Option<&str>,
) -> Result<Vec<i64>> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT created_at_epoch FROM observations WHERE id <= ");
    qb.push_bind(anchor_id);
    if let Some(project) = project {
        qb.push(" AND project = ").push_bind(project.to_string());
    }
    qb.push(" ORDER BY id DESC LIMIT ").push_bind((depth + 1) as i64);

    let rows: Vec<(i64,)> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(|(e,)| e).collect())
}

/// Epochs of up to `depth + 1` observations at or after the anchor id,
/// oldest first.
pub async fn observation_epochs_after_id(
    pool: &DbPool,
    anchor_id: i64,
    depth: usize,
    project: Option<&str>,
) -> Result<Vec<i64>> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT created_at_epoch FROM observations WHERE id >= ");
    qb.push_bind(anchor_id);
    if let Some(project) = project {
        qb.push(" AND project = ").push_bind(project.to_string());
    }
    qb.push(" ORDER BY id ASC LIMIT ").push_bind((depth + 1) as i64);

    let rows: Vec<(i64,)> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(|(e,)| e).collect())
}

/// Epoch variants of the boundary queries, for timestamp anchors. The
/// observation table is the timing backbone: it is denser than summaries
/// or prompts.
pub async fn observation_epochs_before_epoch(
    pool: &DbPool,
    anchor_epoch: i64,
    depth: usize,
    project: Option<&str>,
) -> Result<Vec<i64>> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT created_at_epoch FROM observations WHERE created_at_epoch <= ");
    qb.push_bind(anchor_epoch);
    if let Some(project) = project {
        qb.push(" AND project = ").push_bind(project.to_string());
    }
    qb.push(" ORDER BY created_at_epoch DESC, id DESC LIMIT ")
        .push_bind((depth + 1) as i64);

    let rows: Vec<(i64,)> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(|(e,)| e).collect())
}

pub async fn observation_epochs_after_epoch(
    pool: &DbPool,
    anchor_epoch: i64,
    depth: usize,
    project: Option<&str>,
) -> Result<Vec<i64>> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT created_at_epoch FROM observations WHERE created_at_epoch >= ");
    qb.push_bind(anchor_epoch);
    if let Some(project) = project {
        qb.push(" AND project = ").push_bind(project.to_string());
    }
    qb.push(" ORDER BY created_at_epoch ASC, id ASC LIMIT ")
        .push_bind((depth + 1) as i64);

    let rows: Vec<(i64,)> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(|(e,)| e).collect())
}

/// All observations whose epoch falls in the closed interval [start, end].
pub async fn observations_between(
    pool: &DbPool,
    start_epoch: i64,
    end_epoch: i64,
    project: Option<&str>,
) -> Result<Vec<Observation>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM observations WHERE created_at_epoch >= ",
        OBSERVATION_COLUMNS
    ));
    qb.push_bind(start_epoch);
    qb.push(" AND created_at_epoch <= ").push_bind(end_epoch);
    if let Some(project) = project {
        qb.push(" AND project = ").push_bind(project.to_string());
    }
    qb.push(" ORDER BY created_at_epoch ASC, id ASC");

    let rows: Vec<ObservationRow> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Stream a batch of observations ordered by id, for backfill.
pub async fn observations_page(
    pool: &DbPool,
    after_id: i64,
    batch_size: usize,
) -> Result<Vec<Observation>> {
    let rows: Vec<ObservationRow> = sqlx::query_as(&format!(
        "SELECT {} FROM observations WHERE id > ? ORDER BY id ASC LIMIT ?",
        OBSERVATION_COLUMNS
    ))
    .bind(after_id)
    .bind(batch_size as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}
