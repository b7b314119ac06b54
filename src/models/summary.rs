//! Session summary models.

use serde::{Deserialize, Serialize};

/// A synthesized wrap-up of a session or of one prompt-response cycle.
///
/// A session may accumulate multiple summaries over its life, one per
/// prompt; there is no uniqueness constraint on `session_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub session_id: String,
    pub project: String,
    pub request: Option<String>,
    pub investigated: Option<String>,
    pub learned: Option<String>,
    pub completed: Option<String>,
    pub next_steps: Option<String>,
    pub notes: Option<String>,
    pub files_read: Vec<String>,
    pub files_edited: Vec<String>,
    pub prompt_number: i64,
    pub created_at: String,
    pub created_at_epoch: i64,
}

impl SessionSummary {
    /// The non-null text fields as (field-name, text) pairs, in the order
    /// the sync bridge chunks them.
    pub fn text_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("request", self.request.as_deref()),
            ("investigated", self.investigated.as_deref()),
            ("learned", self.learned.as_deref()),
            ("completed", self.completed.as_deref()),
            ("next_steps", self.next_steps.as_deref()),
            ("notes", self.notes.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// Input for storing a new summary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryDraft {
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub investigated: Option<String>,
    #[serde(default)]
    pub learned: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(default)]
    pub next_steps: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub files_read: Vec<String>,
    #[serde(default)]
    pub files_edited: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_fields_skip_nulls() {
        let summary = SessionSummary {
            id: 1,
            session_id: "s-1".into(),
            project: "demo".into(),
            request: Some("Add retry logic".into()),
            investigated: None,
            learned: Some("The client already retries at the socket layer".into()),
            completed: None,
            next_steps: None,
            notes: None,
            files_read: vec![],
            files_edited: vec![],
            prompt_number: 1,
            created_at: String::new(),
            created_at_epoch: 0,
        };

        let fields = summary.text_fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "request");
        assert_eq!(fields[1].0, "learned");
    }
}
