//! Session models.

use serde::{Deserialize, Serialize};

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One coding conversation.
///
/// `session_id` is the external identifier that every other entity joins
/// on; `id` is the internal numeric identifier, assigned once and immutable
/// for a given external id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub session_id: String,
    pub processing_session_id: Option<String>,
    pub project: String,
    pub request: String,
    pub status: SessionStatus,
    pub prompt_count: i64,
    pub created_at: String,
    pub created_at_epoch: i64,
    pub completed_at: Option<String>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn has_ended(&self) -> bool {
        self.completed_at.is_some()
    }
}
