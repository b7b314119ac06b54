//! Vector chunk identifiers.
//!
//! A chunk is one embeddable unit of text derived from a stored record.
//! Its composite string id encodes (document-type, source-row-id,
//! field-name[, field-index]) and is the sole mechanism by which vector
//! search hits are hydrated back to relational rows, so the encode/decode
//! pair here must round-trip exactly.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Which record table a chunk was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Observation,
    SessionSummary,
    UserPrompt,
}

impl DocumentType {
    /// Payload value stored in the vector index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::SessionSummary => "session_summary",
            Self::UserPrompt => "user_prompt",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "observation" => Some(Self::Observation),
            "session_summary" => Some(Self::SessionSummary),
            "user_prompt" => Some(Self::UserPrompt),
            _ => None,
        }
    }

    /// Short prefix used in composite chunk ids.
    fn prefix(&self) -> &'static str {
        match self {
            Self::Observation => "obs",
            Self::SessionSummary => "sum",
            Self::UserPrompt => "prompt",
        }
    }

    fn from_prefix(s: &str) -> Option<Self> {
        match s {
            "obs" => Some(Self::Observation),
            "sum" => Some(Self::SessionSummary),
            "prompt" => Some(Self::UserPrompt),
            _ => None,
        }
    }
}

/// Build a composite chunk id: `{doc}:{row_id}:{field}`.
pub fn chunk_id(doc: DocumentType, row_id: i64, field: &str) -> String {
    format!("{}:{}:{}", doc.prefix(), row_id, field)
}

/// Build a composite chunk id for an indexed field: `{doc}:{row_id}:{field}:{index}`.
pub fn chunk_id_indexed(doc: DocumentType, row_id: i64, field: &str, index: usize) -> String {
    format!("{}:{}:{}:{}", doc.prefix(), row_id, field, index)
}

/// Parse a composite chunk id back to its (document-type, source-row-id)
/// pair. Returns `None` for anything that is not a well-formed chunk id.
pub fn parse_chunk_id(id: &str) -> Option<(DocumentType, i64)> {
    let mut parts = id.splitn(3, ':');
    let doc = DocumentType::from_prefix(parts.next()?)?;
    let row_id: i64 = parts.next()?.parse().ok()?;
    // The field segment must be present, its content is irrelevant here.
    let field = parts.next()?;
    if field.is_empty() {
        return None;
    }
    Some((doc, row_id))
}

/// Deterministic vector-index point id for a chunk.
///
/// Qdrant point ids must be UUIDs, not arbitrary strings; deriving one from
/// the composite id keeps re-sync an idempotent upsert-by-id.
pub fn point_uuid(chunk_id: &str) -> Uuid {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    // Stamp RFC 4122 version (v4 layout) and variant bits so the id is a
    // valid UUID everywhere it travels.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

/// One embeddable unit headed for the vector index.
#[derive(Debug, Clone)]
pub struct EmbedChunk {
    /// Composite chunk id (also stored in the payload for hydration).
    pub id: String,
    pub doc_type: DocumentType,
    pub source_id: i64,
    pub project: String,
    pub created_at_epoch: i64,
    pub text: String,
    /// Observation-only payload extras: kind, title, concepts.
    pub kind: Option<String>,
    pub title: Option<String>,
    pub concepts: Vec<String>,
}
