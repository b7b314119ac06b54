//! Text Index: full-text keyword search over record text.
//!
//! Backed by the FTS5 table created in migrations.rs and maintained by
//! insert triggers. This index is reachable only through the explicit
//! keyword search mode; it is deliberately NOT an automatic fallback for
//! the semantic path (mixing ranking semantics between backends produces
//! inconsistent result ordering).

use sqlx::FromRow;

use crate::error::Result;
use crate::models::DocumentType;

use super::DbPool;

/// One keyword-search hit, already resolved to its source row.
#[derive(Debug, Clone, FromRow)]
pub struct FtsHit {
    pub doc_type: String,
    pub source_id: i64,
    pub rank: f64,
}

impl FtsHit {
    pub fn document_type(&self) -> Option<DocumentType> {
        DocumentType::from_str(&self.doc_type)
    }
}

/// Search the full-text index, best matches first (bm25).
///
/// The raw query is tokenized and each term quoted, so user input never
/// reaches FTS5 as query syntax.
pub async fn keyword_search(
    pool: &DbPool,
    query: &str,
    doc_type: Option<DocumentType>,
    project: Option<&str>,
    limit: usize,
) -> Result<Vec<FtsHit>> {
    let match_expr = quote_terms(query);
    if match_expr.is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT doc_type, source_id, rank FROM record_fts WHERE record_fts MATCH ?",
    );
    if doc_type.is_some() {
        sql.push_str(" AND doc_type = ?");
    }
    if project.is_some() {
        sql.push_str(" AND (project = ? OR project = '')");
    }
    sql.push_str(" ORDER BY rank LIMIT ?");

    let mut q = sqlx::query_as::<_, FtsHit>(&sql).bind(match_expr);
    if let Some(doc_type) = doc_type {
        q = q.bind(doc_type.as_str());
    }
    if let Some(project) = project {
        q = q.bind(project.to_string());
    }
    q = q.bind(limit as i64);

    Ok(q.fetch_all(pool).await?)
}

/// Quote each whitespace-separated term for a literal FTS5 match.
fn quote_terms(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}
