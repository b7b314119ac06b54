//! Health and status routes.
//!
//! - GET /health - liveness only
//! - GET /status - store/index diagnostics
//! - POST /admin/backfill - force a vector-index backfill pass

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::db::{self, TableCounts};
use crate::services::BackfillReport;
use crate::{AppState, Result};

static STARTUP_TIME: OnceLock<Instant> = OnceLock::new();

/// Record the process start for uptime reporting.
pub fn init_startup_time() {
    let _ = STARTUP_TIME.set(Instant::now());
}

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/admin/backfill", post(backfill))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub uptime_seconds: u64,
    pub tables: TableCounts,
    pub vector_index: VectorIndexStatus,
}

#[derive(Debug, Serialize)]
pub struct VectorIndexStatus {
    pub available: bool,
    pub points: Option<u64>,
}

#[axum::debug_handler]
async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let tables = db::table_counts(&state.db).await?;

    let available = state.vectors.is_available();
    let points = if available {
        state.vectors.count().await.ok()
    } else {
        None
    };

    Ok(Json(StatusResponse {
        uptime_seconds: STARTUP_TIME
            .get()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0),
        tables,
        vector_index: VectorIndexStatus { available, points },
    }))
}

#[axum::debug_handler]
async fn backfill(State(state): State<AppState>) -> Result<Json<BackfillReport>> {
    let report = state.sync.ensure_backfilled().await?;
    Ok(Json(report))
}
