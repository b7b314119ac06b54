//! Application state for Recall.
//!
//! All services are constructed once at process start and handed to every
//! component that needs them; the top-level state object owns the store
//! handle for its whole lifetime.

use crate::config::{Config, SearchConfig};
use crate::db::DbPool;
use crate::services::{
    EmbeddingService, SearchService, SyncBridge, TimelineService, VectorIndexService,
};
use crate::Result;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (the source of truth).
    pub db: DbPool,
    /// Vector index handle; may be in degraded mode.
    pub vectors: VectorIndexService,
    /// Embedding generation service.
    pub embeddings: EmbeddingService,
    /// Relational-to-vector sync bridge.
    pub sync: SyncBridge,
    /// Hybrid retrieval engine.
    pub search: SearchService,
    /// Timeline reconstructor.
    pub timeline: TimelineService,
}

impl AppState {
    /// Create a new application state, initializing all services.
    ///
    /// A migration failure here is fatal; a vector-index connection failure
    /// is not - the service comes up in degraded mode (filter-only search,
    /// empty semantic results).
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::init_pool(&config.database.path).await?;
        crate::db::initialize_schema(&db).await?;

        let embeddings = EmbeddingService::new(&config.embedding)?;
        let vectors =
            VectorIndexService::connect(&config.vector, embeddings.dimension()).await;

        Ok(Self::assemble(
            db,
            vectors,
            embeddings,
            config.search.clone(),
        ))
    }

    /// Wire services around existing handles. Used by `new` and by tests
    /// that inject an in-process vector backend.
    pub fn assemble(
        db: DbPool,
        vectors: VectorIndexService,
        embeddings: EmbeddingService,
        search_config: SearchConfig,
    ) -> Self {
        let sync = SyncBridge::new(db.clone(), vectors.clone(), embeddings.clone());
        let search = SearchService::new(
            db.clone(),
            vectors.clone(),
            embeddings.clone(),
            search_config,
        );
        let timeline = TimelineService::new(db.clone(), search.clone());

        Self {
            db,
            vectors,
            embeddings,
            sync,
            search,
            timeline,
        }
    }
}
