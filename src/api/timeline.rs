//! Timeline routes.
//!
//! GET /timeline - reconstruct a chronological window of observations,
//! session summaries, and user prompts around an anchor. Exactly one of
//! `anchor` (observation id, `S<n>` session reference, or RFC 3339
//! timestamp) or `query` (free text resolved semantically) must be given.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::services::{Anchor, Timeline};
use crate::{AppState, Error, Result};

/// Build timeline routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/timeline", get(timeline))
}

const MAX_DEPTH: usize = 50;

#[derive(Debug, Deserialize)]
pub struct TimelineParams {
    pub anchor: Option<String>,
    pub query: Option<String>,
    #[serde(default = "default_depth")]
    pub depth_before: usize,
    #[serde(default = "default_depth")]
    pub depth_after: usize,
    pub project: Option<String>,
}

fn default_depth() -> usize {
    5
}

#[axum::debug_handler]
async fn timeline(
    State(state): State<AppState>,
    Query(params): Query<TimelineParams>,
) -> Result<Json<Timeline>> {
    let anchor = match (&params.anchor, &params.query) {
        (Some(_), Some(_)) => {
            return Err(Error::Validation(
                "provide either anchor or query, not both".into(),
            ));
        }
        (None, None) => {
            return Err(Error::Validation("provide an anchor or a query".into()));
        }
        (Some(raw), None) => Anchor::parse(raw)
            .ok_or_else(|| Error::Validation(format!("unparseable anchor: {}", raw)))?,
        (None, Some(text)) => {
            if text.trim().is_empty() {
                return Err(Error::Validation("query must not be empty".into()));
            }
            Anchor::Query(text.clone())
        }
    };

    let timeline = state
        .timeline
        .reconstruct(
            anchor,
            params.depth_before.min(MAX_DEPTH),
            params.depth_after.min(MAX_DEPTH),
            params.project.as_deref(),
        )
        .await?;

    Ok(Json(timeline))
}
