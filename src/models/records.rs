//! Tagged union over the three searchable record types.
//!
//! Both the retrieval engine and the timeline reconstructor return this
//! shape: an ordered, typed list of records the renderer consumes.

use serde::Serialize;

use super::{DocumentType, Observation, SessionSummary, UserPrompt};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordItem {
    Observation(Observation),
    SessionSummary(SessionSummary),
    UserPrompt(UserPrompt),
}

impl RecordItem {
    pub fn doc_type(&self) -> DocumentType {
        match self {
            Self::Observation(_) => DocumentType::Observation,
            Self::SessionSummary(_) => DocumentType::SessionSummary,
            Self::UserPrompt(_) => DocumentType::UserPrompt,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Observation(o) => o.id,
            Self::SessionSummary(s) => s.id,
            Self::UserPrompt(p) => p.id,
        }
    }

    pub fn created_at_epoch(&self) -> i64 {
        match self {
            Self::Observation(o) => o.created_at_epoch,
            Self::SessionSummary(s) => s.created_at_epoch,
            Self::UserPrompt(p) => p.created_at_epoch,
        }
    }

    /// Deterministic tie-break priority for equal-epoch merges: a prompt
    /// precedes the work it triggered, and a summary wraps it up.
    pub fn merge_priority(&self) -> u8 {
        match self {
            Self::UserPrompt(_) => 0,
            Self::Observation(_) => 1,
            Self::SessionSummary(_) => 2,
        }
    }
}
