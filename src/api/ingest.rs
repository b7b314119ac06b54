//! Ingestion routes, consumed by the observation-extractor collaborator.
//!
//! Every endpoint is idempotent where the data model demands it (session
//! init) and returns as soon as the relational write commits; the matching
//! vector sync runs as a detached task. A just-stored record may therefore
//! not be semantically searchable for a bounded moment.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::models::{ObservationDraft, SessionStatus, SummaryDraft};
use crate::{db, AppState, Error, Result};

/// Build ingestion routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/init", post(init_session))
        .route("/sessions/:session_id/complete", post(complete_session))
        .route("/observations", post(store_observation))
        .route("/summaries", post(store_summary))
        .route("/prompts", post(store_prompt))
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct InitSessionRequest {
    pub session_id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub request: String,
    pub processing_session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitSessionResponse {
    pub id: i64,
}

#[axum::debug_handler]
async fn init_session(
    State(state): State<AppState>,
    Json(body): Json<InitSessionRequest>,
) -> Result<Json<InitSessionResponse>> {
    if body.session_id.trim().is_empty() {
        return Err(Error::Validation("session_id must not be empty".into()));
    }

    let id = db::create_session(&state.db, &body.session_id, &body.project, &body.request).await?;

    if let Some(processing_id) = &body.processing_session_id {
        db::attach_processing_session(&state.db, &body.session_id, processing_id).await?;
    }

    Ok(Json(InitSessionResponse { id }))
}

#[derive(Debug, Deserialize)]
pub struct CompleteSessionRequest {
    /// completed | failed
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CompleteSessionResponse {
    /// False when the session had already reached a terminal status.
    pub transitioned: bool,
}

#[axum::debug_handler]
async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<CompleteSessionRequest>,
) -> Result<Json<CompleteSessionResponse>> {
    let status = SessionStatus::from_str(&body.status)
        .filter(|s| *s != SessionStatus::Active)
        .ok_or_else(|| {
            Error::Validation(format!("status must be completed or failed, got {}", body.status))
        })?;

    if db::get_session_by_external_id(&state.db, &session_id)
        .await?
        .is_none()
    {
        return Err(Error::NotFound(format!("session {}", session_id)));
    }

    let transitioned = db::complete_session(&state.db, &session_id, status).await?;

    Ok(Json(CompleteSessionResponse { transitioned }))
}

// ============================================================================
// Observations
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StoreObservationRequest {
    pub session_id: String,
    #[serde(default)]
    pub project: String,
    pub prompt_number: Option<i64>,
    #[serde(flatten)]
    pub observation: ObservationDraft,
}

#[derive(Debug, Serialize)]
pub struct StoreObservationResponse {
    pub id: i64,
    pub created_at_epoch: i64,
}

#[axum::debug_handler]
async fn store_observation(
    State(state): State<AppState>,
    Json(body): Json<StoreObservationRequest>,
) -> Result<Json<StoreObservationResponse>> {
    let prompt_number = match body.prompt_number {
        Some(n) => n,
        None => current_prompt_number(&state, &body.session_id).await?,
    };

    let observation = db::store_observation(
        &state.db,
        &body.session_id,
        &body.project,
        body.observation,
        prompt_number,
    )
    .await?;

    let response = StoreObservationResponse {
        id: observation.id,
        created_at_epoch: observation.created_at_epoch,
    };

    // Detached: the caller does not wait for the vector index
    state.sync.spawn_observation_sync(observation);

    Ok(Json(response))
}

// ============================================================================
// Summaries
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StoreSummaryRequest {
    pub session_id: String,
    #[serde(default)]
    pub project: String,
    pub prompt_number: Option<i64>,
    #[serde(flatten)]
    pub summary: SummaryDraft,
}

#[derive(Debug, Serialize)]
pub struct StoreSummaryResponse {
    pub id: i64,
    pub created_at_epoch: i64,
}

#[axum::debug_handler]
async fn store_summary(
    State(state): State<AppState>,
    Json(body): Json<StoreSummaryRequest>,
) -> Result<Json<StoreSummaryResponse>> {
    let prompt_number = match body.prompt_number {
        Some(n) => n,
        None => current_prompt_number(&state, &body.session_id).await?,
    };

    let summary = db::store_summary(
        &state.db,
        &body.session_id,
        &body.project,
        body.summary,
        prompt_number,
    )
    .await?;

    let response = StoreSummaryResponse {
        id: summary.id,
        created_at_epoch: summary.created_at_epoch,
    };

    state.sync.spawn_summary_sync(summary);

    Ok(Json(response))
}

// ============================================================================
// Prompts
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StorePromptRequest {
    pub session_id: String,
    /// Assigned from the session's counter when absent.
    pub prompt_number: Option<i64>,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct StorePromptResponse {
    pub id: i64,
    pub prompt_number: i64,
}

#[axum::debug_handler]
async fn store_prompt(
    State(state): State<AppState>,
    Json(body): Json<StorePromptRequest>,
) -> Result<Json<StorePromptResponse>> {
    if body.text.trim().is_empty() {
        return Err(Error::Validation("prompt text must not be empty".into()));
    }

    let prompt = db::store_prompt(&state.db, &body.session_id, body.prompt_number, &body.text)
        .await?;

    let response = StorePromptResponse {
        id: prompt.id,
        prompt_number: prompt.prompt_number,
    };

    state.sync.spawn_prompt_sync(prompt);

    Ok(Json(response))
}

/// The owning session's current prompt counter, for records that arrive
/// without an explicit prompt number. Zero when the session is unknown
/// (ingestion auto-creates it a moment later).
async fn current_prompt_number(state: &AppState, session_id: &str) -> Result<i64> {
    Ok(db::get_session_by_external_id(&state.db, session_id)
        .await?
        .map(|s| s.prompt_count)
        .unwrap_or(0))
}
