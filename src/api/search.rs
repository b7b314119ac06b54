//! Search routes.
//!
//! GET /search - hybrid search across observations, session summaries, and
//! user prompts. With a `query` the semantic path runs; without one the
//! filter-only path queries the relational store directly (the only path
//! with date-range support). `mode=keyword` opts into the full-text index.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::models::{DocumentType, ObservationKind, RecordItem};
use crate::services::{OrderBy, SearchQuery};
use crate::{AppState, Error, Result};

/// Build search routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/search", get(search))
}

const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Free-text query; absent means filter-only.
    pub query: Option<String>,
    /// observations | sessions | prompts
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    /// Observation sub-type filter.
    pub kind: Option<String>,
    pub concept: Option<String>,
    pub file: Option<String>,
    /// RFC 3339 timestamps bounding the filter-only path.
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub project: Option<String>,
    /// semantic (default) | keyword
    pub mode: Option<String>,
    /// index (compact) | full
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// relevance (default) | date_desc | date_asc
    pub order_by: Option<String>,
}

fn default_format() -> String {
    "full".to_string()
}

fn default_limit() -> usize {
    20
}

/// Compact listing entry for format=index.
#[derive(Debug, Serialize)]
pub struct IndexEntry {
    #[serde(rename = "type")]
    pub doc_type: &'static str,
    pub id: i64,
    pub title: String,
    pub date: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Full(Vec<RecordItem>),
    Index(Vec<IndexEntry>),
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: Option<String>,
    pub total: usize,
    pub results: SearchResults,
    pub took_ms: u64,
}

#[axum::debug_handler]
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let start = std::time::Instant::now();

    let query = parse_params(&params)?;

    let items = match params.mode.as_deref() {
        Some("keyword") => {
            let text = query
                .query
                .clone()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| Error::Validation("keyword mode requires a query".into()))?;
            state.search.search_keyword(&text, &query).await?
        }
        Some("semantic") | None => state.search.search(&query).await?,
        Some(other) => {
            return Err(Error::Validation(format!("unknown search mode: {}", other)));
        }
    };

    let total = items.len();
    let results = if params.format == "index" {
        SearchResults::Index(items.iter().map(index_entry).collect())
    } else {
        SearchResults::Full(items)
    };

    Ok(Json(SearchResponse {
        query: params.query,
        total,
        results,
        took_ms: start.elapsed().as_millis() as u64,
    }))
}

/// Parse and validate wire parameters into an engine query. Filters that do
/// not apply to the resolved document types are ignored downstream, not
/// rejected here.
fn parse_params(params: &SearchParams) -> Result<SearchQuery> {
    let doc_type = match params.doc_type.as_deref() {
        None => None,
        Some("observations") => Some(DocumentType::Observation),
        Some("sessions") => Some(DocumentType::SessionSummary),
        Some("prompts") => Some(DocumentType::UserPrompt),
        Some(other) => {
            return Err(Error::Validation(format!("unknown type filter: {}", other)));
        }
    };

    let kind = match params.kind.as_deref() {
        None => None,
        Some(raw) => Some(
            ObservationKind::from_str(raw)
                .ok_or_else(|| Error::Validation(format!("unknown observation kind: {}", raw)))?,
        ),
    };

    let order_by = match params.order_by.as_deref() {
        None | Some("relevance") => OrderBy::Relevance,
        Some("date_desc") => OrderBy::DateDesc,
        Some("date_asc") => OrderBy::DateAsc,
        Some(other) => {
            return Err(Error::Validation(format!("unknown order_by: {}", other)));
        }
    };

    Ok(SearchQuery {
        query: params.query.clone(),
        doc_type,
        kind,
        concept: params.concept.clone(),
        file: params.file.clone(),
        date_start_epoch: parse_date(params.date_start.as_deref())?,
        date_end_epoch: parse_date(params.date_end.as_deref())?,
        project: params.project.clone(),
        limit: params.limit.clamp(1, MAX_LIMIT),
        offset: params.offset,
        order_by,
    })
}

fn parse_date(raw: Option<&str>) -> Result<Option<i64>> {
    match raw {
        None => Ok(None),
        Some(raw) => chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.timestamp_millis()))
            .map_err(|_| Error::Validation(format!("invalid RFC 3339 date: {}", raw))),
    }
}

fn index_entry(item: &RecordItem) -> IndexEntry {
    match item {
        RecordItem::Observation(o) => IndexEntry {
            doc_type: "observation",
            id: o.id,
            title: o.title.clone(),
            date: o.created_at.clone(),
        },
        RecordItem::SessionSummary(s) => IndexEntry {
            doc_type: "session_summary",
            id: s.id,
            title: s
                .request
                .clone()
                .unwrap_or_else(|| format!("Summary for {}", s.session_id)),
            date: s.created_at.clone(),
        },
        RecordItem::UserPrompt(p) => IndexEntry {
            doc_type: "user_prompt",
            id: p.id,
            title: snippet(&p.text, 80),
            date: p.created_at.clone(),
        },
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated.trim_end())
    }
}
