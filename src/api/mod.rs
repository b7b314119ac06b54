//! API routes for Recall.
//!
//! Route structure:
//! - /search, /timeline - read side (hybrid retrieval + reconstruction)
//! - /observation/:id, /session/:id, /prompt/:id - direct hydration
//! - /sessions/*, /observations, /summaries, /prompts - ingestion
//!   (consumed by the observation-extractor collaborator)
//! - /health, /status, /admin/backfill - diagnostics

mod ingest;
mod records;
mod search;
pub mod status;
mod timeline;

use axum::Router;

use crate::AppState;

/// Build the complete API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .merge(search::routes())
        .merge(timeline::routes())
        .merge(records::routes())
        .merge(ingest::routes())
}
