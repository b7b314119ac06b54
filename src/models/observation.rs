//! Observation models.

use serde::{Deserialize, Serialize};

/// Semantic type of an observation. Closed enumeration: storing any other
/// value is a constraint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Decision,
    Bugfix,
    Feature,
    Refactor,
    Discovery,
    Change,
}

impl ObservationKind {
    pub const ALL: [ObservationKind; 6] = [
        Self::Decision,
        Self::Bugfix,
        Self::Feature,
        Self::Refactor,
        Self::Discovery,
        Self::Change,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Bugfix => "bugfix",
            Self::Feature => "feature",
            Self::Refactor => "refactor",
            Self::Discovery => "discovery",
            Self::Change => "change",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "decision" => Some(Self::Decision),
            "bugfix" => Some(Self::Bugfix),
            "feature" => Some(Self::Feature),
            "refactor" => Some(Self::Refactor),
            "discovery" => Some(Self::Discovery),
            "change" => Some(Self::Change),
            _ => None,
        }
    }
}

/// One captured unit of work: a tool call's outcome, summarized by the
/// extractor collaborator. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub session_id: String,
    pub project: String,
    pub kind: ObservationKind,
    pub title: String,
    pub subtitle: Option<String>,
    pub facts: Vec<String>,
    pub narrative: Option<String>,
    pub concepts: Vec<String>,
    pub files_read: Vec<String>,
    pub files_modified: Vec<String>,
    pub prompt_number: i64,
    pub tokens: i64,
    pub created_at: String,
    pub created_at_epoch: i64,
}

impl Observation {
    /// The text the summary chunk is built from: title, subtitle, and
    /// narrative joined into one embeddable unit.
    pub fn summary_text(&self) -> String {
        let mut text = self.title.clone();
        if let Some(subtitle) = &self.subtitle {
            text.push_str("\n");
            text.push_str(subtitle);
        }
        if let Some(narrative) = &self.narrative {
            text.push_str("\n");
            text.push_str(narrative);
        }
        text
    }
}

/// Input for storing a new observation. The id and timestamps are assigned
/// by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservationDraft {
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub files_read: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub tokens: i64,
}
