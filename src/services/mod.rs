//! Service layer for Recall.
//!
//! Contains the query-time and write-time orchestration:
//! - Embeddings (multi-provider with fallback)
//! - VectorIndex (Qdrant behind a backend trait, degraded-mode aware)
//! - Sync (relational-to-vector bridge with backfill)
//! - Search (hybrid retrieval engine)
//! - Timeline (chronological window reconstruction)

mod embeddings;
mod search;
mod sync;
mod timeline;
pub mod vector_index;

pub use embeddings::EmbeddingService;
pub use search::{OrderBy, SearchQuery, SearchService};
pub use sync::{BackfillReport, SyncBridge};
pub use timeline::{Anchor, Timeline, TimelineService};
pub use vector_index::{VectorBackend, VectorIndexService};
