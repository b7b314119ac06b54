//! Shared test setup: an in-memory SQLite store plus an in-process vector
//! backend with brute-force cosine scoring, wired into a full AppState.
//! Together with the deterministic hash embedder this makes the whole
//! ingest -> sync -> search loop reproducible offline.
#![allow(dead_code)] // not every test binary uses every helper

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use recall::config::{EmbeddingConfig, SearchConfig};
use recall::error::Result;
use recall::services::vector_index::{ChunkFilter, VectorHit, VectorPoint, KEY_CHUNK_ID};
use recall::services::{EmbeddingService, VectorBackend, VectorIndexService};
use recall::{db, AppState};

/// Brute-force in-process vector index keyed by chunk id.
#[derive(Default)]
pub struct MemoryBackend {
    points: Mutex<HashMap<String, (Vec<f32>, HashMap<String, Value>)>>,
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        let mut store = self.points.lock().unwrap();
        for point in points {
            let mut payload = point.payload;
            payload.insert(KEY_CHUNK_ID.to_string(), Value::String(point.chunk_id.clone()));
            store.insert(point.chunk_id, (point.vector, payload));
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<ChunkFilter>,
    ) -> Result<Vec<VectorHit>> {
        let store = self.points.lock().unwrap();

        let mut hits: Vec<VectorHit> = store
            .iter()
            .filter(|(_, (_, payload))| {
                let Some(filter) = &filter else { return true };
                if let Some(doc_type) = filter.doc_type {
                    if payload.get("doc_type").and_then(|v| v.as_str())
                        != Some(doc_type.as_str())
                    {
                        return false;
                    }
                }
                if let Some(project) = &filter.project {
                    let p = payload.get("project").and_then(|v| v.as_str()).unwrap_or("");
                    // Prompts carry no project; let them through
                    if !p.is_empty() && p != project {
                        return false;
                    }
                }
                true
            })
            .map(|(chunk_id, (point_vector, payload))| VectorHit {
                chunk_id: chunk_id.clone(),
                score: cosine(&vector, point_vector),
                payload: payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.points.lock().unwrap().len() as u64)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

pub fn search_config() -> SearchConfig {
    SearchConfig {
        recency_days: 90,
        candidate_limit: 100,
    }
}

pub fn embedding_service() -> EmbeddingService {
    EmbeddingService::new(&EmbeddingConfig {
        providers: Vec::new(),
        dimension: 64,
    })
    .expect("embedding service")
}

/// Full state over an in-memory database and the in-process vector backend.
pub async fn test_state() -> AppState {
    let pool = db::init_pool(":memory:").await.expect("pool");
    db::initialize_schema(&pool).await.expect("schema");

    let vectors = VectorIndexService::with_backend(
        std::sync::Arc::new(MemoryBackend::default()),
        Duration::from_secs(5),
    );

    AppState::assemble(pool, vectors, embedding_service(), search_config())
}

/// Full state with the vector index entirely unavailable (degraded mode).
pub async fn degraded_state() -> AppState {
    let pool = db::init_pool(":memory:").await.expect("pool");
    db::initialize_schema(&pool).await.expect("schema");

    AppState::assemble(
        pool,
        VectorIndexService::disabled(),
        embedding_service(),
        search_config(),
    )
}
