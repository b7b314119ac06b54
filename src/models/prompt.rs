//! User prompt models.

use serde::{Deserialize, Serialize};

/// The raw text a user submitted within a session.
///
/// Joined to sessions via the external `session_id` because the internal
/// numeric id may not be resolved yet at prompt-capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrompt {
    pub id: i64,
    pub session_id: String,
    pub prompt_number: i64,
    pub text: String,
    pub created_at: String,
    pub created_at_epoch: i64,
}
