//! Error types for Recall.
//!
//! Uses thiserror for ergonomic error definitions that integrate
//! with axum's response system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Write-path invariant violations
    #[error("Constraint violation: {0}")]
    Constraint(String),

    // Resource errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // External service errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Vector index unavailable: {0}")]
    VectorUnavailable(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    // Startup errors
    #[error("Migration failed: {0}")]
    Migration(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400
            Self::Constraint(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,

            // 404
            Self::NotFound(_) => StatusCode::NOT_FOUND,

            // 503 - only reachable when a handler chooses to surface it;
            // the retrieval engine degrades instead (see services::search)
            Self::VectorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500
            Self::Database(_)
            | Self::Embedding(_)
            | Self::Migration(_)
            | Self::Internal(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Constraint(_) => "CONSTRAINT_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::VectorUnavailable(_) => "VECTOR_INDEX_UNAVAILABLE",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

// Convenience conversions
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON encoding error: {}", err))
    }
}
