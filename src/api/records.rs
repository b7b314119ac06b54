//! Direct record hydration routes.
//!
//! GET /observation/:id, /session/:id, /prompt/:id - fetch one record by
//! id with 404 semantics when absent. Sessions resolve by internal numeric
//! id or external identifier.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::models::{Observation, Session, SessionSummary, UserPrompt};
use crate::{db, AppState, Error, Result};

/// Build record hydration routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/observation/:id", get(get_observation))
        .route("/session/:id", get(get_session))
        .route("/summary/:id", get(get_summary))
        .route("/prompt/:id", get(get_prompt))
}

#[axum::debug_handler]
async fn get_observation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Observation>> {
    db::get_observation(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("observation {}", id)))
}

#[axum::debug_handler]
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>> {
    let session = match id.parse::<i64>() {
        Ok(numeric) => db::get_session(&state.db, numeric).await?,
        Err(_) => db::get_session_by_external_id(&state.db, &id).await?,
    };

    session
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("session {}", id)))
}

#[axum::debug_handler]
async fn get_summary(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SessionSummary>> {
    db::get_summary(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("summary {}", id)))
}

#[axum::debug_handler]
async fn get_prompt(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserPrompt>> {
    db::get_prompt(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("prompt {}", id)))
}
