//! Vector index service.
//!
//! Stores one embedding per chunk in Qdrant and serves approximate
//! nearest-neighbor queries with exact-match metadata predicates. The
//! backend sits behind a trait so the retrieval engine and sync bridge are
//! testable without a running Qdrant.
//!
//! The service degrades instead of failing: if the backend could not be
//! initialized at startup, or a call times out, callers see
//! `Error::VectorUnavailable` and decide how to degrade (the retrieval
//! engine returns empty Path B results; the sync bridge logs and moves on).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    condition::ConditionOneOf, r#match::MatchValue, Condition, CreateCollectionBuilder, Distance,
    FieldCondition, Filter, Match, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::VectorConfig;
use crate::error::{Error, Result};
use crate::models::{point_uuid, DocumentType};

/// Payload key names
pub const KEY_CHUNK_ID: &str = "chunk_id";
pub const KEY_DOC_TYPE: &str = "doc_type";
pub const KEY_SOURCE_ID: &str = "source_id";
pub const KEY_PROJECT: &str = "project";
pub const KEY_EPOCH: &str = "created_at_epoch";
pub const KEY_KIND: &str = "kind";
pub const KEY_TITLE: &str = "title";
pub const KEY_CONCEPTS: &str = "concepts";

/// One point headed into the index.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, Value>,
}

/// One nearest-neighbor hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub score: f32,
    pub payload: HashMap<String, Value>,
}

/// Exact-match metadata predicates. Range comparisons are deliberately not
/// supported here; date filtering always round-trips through the
/// relational store.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub doc_type: Option<DocumentType>,
    pub project: Option<String>,
}

impl ChunkFilter {
    pub fn is_empty(&self) -> bool {
        self.doc_type.is_none() && self.project.is_none()
    }
}

/// Storage backend for the vector index.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Idempotent upsert keyed by chunk id.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Approximate nearest-neighbor search with optional metadata filter.
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<ChunkFilter>,
    ) -> Result<Vec<VectorHit>>;

    /// Total number of points in the index.
    async fn count(&self) -> Result<u64>;
}

// ============================================================================
// Qdrant backend
// ============================================================================

/// Production backend: one Qdrant collection holding every chunk, tagged
/// with document-type and project payload fields.
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
}

impl QdrantBackend {
    /// Connect and ensure the collection exists with the given dimension.
    pub async fn connect(config: &VectorConfig, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .build()
            .map_err(|e| Error::VectorUnavailable(format!("Failed to connect to Qdrant: {}", e)))?;

        let exists = client
            .collection_exists(&config.collection)
            .await
            .map_err(|e| Error::VectorUnavailable(format!("Qdrant connection test failed: {}", e)))?;

        if !exists {
            client
                .create_collection(
                    CreateCollectionBuilder::new(&config.collection).vectors_config(
                        VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| {
                    Error::VectorUnavailable(format!("Failed to create collection: {}", e))
                })?;
            info!(collection = %config.collection, dimension, "Created Qdrant collection");
        }

        info!(url = %config.url, collection = %config.collection, "Qdrant backend connected");

        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                // Qdrant point ids must be UUIDs; the composite chunk id
                // rides in the payload for hydration.
                let id = point_uuid(&point.chunk_id).to_string();
                let mut payload = point.payload;
                payload.insert(KEY_CHUNK_ID.to_string(), Value::String(point.chunk_id));

                let qdrant_payload: HashMap<String, QdrantValue> = payload
                    .into_iter()
                    .filter_map(|(k, v)| json_to_qdrant_value(v).map(|qv| (k, qv)))
                    .collect();

                PointStruct::new(id, point.vector, qdrant_payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, qdrant_points))
            .await
            .map_err(|e| Error::VectorUnavailable(format!("Failed to upsert points: {}", e)))?;

        debug!(collection = %self.collection, count, "Upserted points");

        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<ChunkFilter>,
    ) -> Result<Vec<VectorHit>> {
        let mut builder =
            SearchPointsBuilder::new(&self.collection, vector, limit as u64).with_payload(true);

        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            builder = builder.filter(to_qdrant_filter(&f));
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::VectorUnavailable(format!("Search failed: {}", e)))?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let payload: HashMap<String, Value> = point
                    .payload
                    .into_iter()
                    .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
                    .collect();

                // Hits without a chunk id cannot be hydrated; drop them
                let chunk_id = payload.get(KEY_CHUNK_ID)?.as_str()?.to_string();

                Some(VectorHit {
                    chunk_id,
                    score: point.score,
                    payload,
                })
            })
            .collect();

        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| Error::VectorUnavailable(format!("Failed to get collection info: {}", e)))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }
}

fn to_qdrant_filter(filter: &ChunkFilter) -> Filter {
    let mut conditions = Vec::new();

    if let Some(doc_type) = filter.doc_type {
        conditions.push(make_match_condition(KEY_DOC_TYPE, doc_type.as_str()));
    }
    if let Some(project) = &filter.project {
        conditions.push(make_match_condition(KEY_PROJECT, project));
    }

    Filter {
        must: conditions,
        ..Default::default()
    }
}

fn make_match_condition(key: &str, value: &str) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(MatchValue::Keyword(value.to_string())),
            }),
            ..Default::default()
        })),
    }
}

fn json_to_qdrant_value(value: Value) -> Option<QdrantValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(QdrantValue::from(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(QdrantValue::from(i))
            } else {
                n.as_f64().map(QdrantValue::from)
            }
        }
        Value::String(s) => Some(QdrantValue::from(s)),
        Value::Array(arr) => {
            let values: Vec<QdrantValue> =
                arr.into_iter().filter_map(json_to_qdrant_value).collect();
            Some(QdrantValue::from(values))
        }
        Value::Object(_) => Some(QdrantValue::from(value.to_string())),
    }
}

fn qdrant_value_to_json(value: QdrantValue) -> Option<Value> {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        Some(Kind::NullValue(_)) => Some(Value::Null),
        Some(Kind::BoolValue(b)) => Some(Value::Bool(b)),
        Some(Kind::IntegerValue(i)) => Some(Value::Number(i.into())),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d).map(Value::Number),
        Some(Kind::StringValue(s)) => Some(Value::String(s)),
        Some(Kind::ListValue(list)) => {
            let values: Vec<Value> = list
                .values
                .into_iter()
                .filter_map(qdrant_value_to_json)
                .collect();
            Some(Value::Array(values))
        }
        Some(Kind::StructValue(obj)) => {
            let map: serde_json::Map<String, Value> = obj
                .fields
                .into_iter()
                .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
                .collect();
            Some(Value::Object(map))
        }
        None => None,
    }
}

// ============================================================================
// Service wrapper
// ============================================================================

/// Shared vector-index handle with timeout and degraded-mode handling.
#[derive(Clone)]
pub struct VectorIndexService {
    backend: Option<Arc<dyn VectorBackend>>,
    timeout: Duration,
}

impl VectorIndexService {
    /// Connect to Qdrant; on failure, come up in degraded mode instead of
    /// refusing to start (filter-only search keeps working).
    pub async fn connect(config: &VectorConfig, dimension: usize) -> Self {
        match QdrantBackend::connect(config, dimension).await {
            Ok(backend) => Self {
                backend: Some(Arc::new(backend)),
                timeout: config.timeout,
            },
            Err(e) => {
                warn!(
                    error = %e,
                    "Vector index unavailable - semantic search disabled. \
                     Start Qdrant and restart (or call the backfill endpoint) to enable it."
                );
                Self {
                    backend: None,
                    timeout: config.timeout,
                }
            }
        }
    }

    /// Build from an explicit backend (dependency injection for tests and
    /// alternative deployments).
    pub fn with_backend(backend: Arc<dyn VectorBackend>, timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            timeout,
        }
    }

    /// A service with no backend at all: every call degrades.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&Arc<dyn VectorBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| Error::VectorUnavailable("no vector backend configured".to_string()))
    }

    pub async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        let backend = self.backend()?;
        tokio::time::timeout(self.timeout, backend.upsert(points))
            .await
            .map_err(|_| Error::VectorUnavailable("upsert timed out".to_string()))?
    }

    /// A timed-out query is treated identically to an unavailable index.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<ChunkFilter>,
    ) -> Result<Vec<VectorHit>> {
        let backend = self.backend()?;
        tokio::time::timeout(self.timeout, backend.search(vector, limit, filter))
            .await
            .map_err(|_| Error::VectorUnavailable("search timed out".to_string()))?
    }

    pub async fn count(&self) -> Result<u64> {
        let backend = self.backend()?;
        tokio::time::timeout(self.timeout, backend.count())
            .await
            .map_err(|_| Error::VectorUnavailable("count timed out".to_string()))?
    }
}
