//! Sync bridge between the relational store and the vector index.
//!
//! Projects every relational write into embeddable chunks and upserts them.
//! Decomposition is stable: the same record always produces the same set of
//! chunk ids, so re-sync is idempotent via upsert-by-id. The vector index
//! is purely derived state - the backfill path can always rebuild it from
//! the relational store.
//!
//! Sync runs best-effort after the relational write commits: failures are
//! logged, never raised to the ingestion caller, and a later backfill pass
//! self-heals.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::db::{self, DbPool};
use crate::error::Result;
use crate::models::{
    chunk_id, chunk_id_indexed, DocumentType, EmbedChunk, Observation, SessionSummary, UserPrompt,
};
use crate::services::vector_index::{
    VectorIndexService, VectorPoint, KEY_CONCEPTS, KEY_DOC_TYPE, KEY_EPOCH, KEY_KIND, KEY_PROJECT,
    KEY_SOURCE_ID, KEY_TITLE,
};
use crate::services::EmbeddingService;

/// Rows per backfill batch (bounded to respect index API limits).
const BACKFILL_BATCH_SIZE: usize = 100;

/// Outcome of a backfill pass.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BackfillReport {
    /// Chunks the relational store should be represented by.
    pub expected_chunks: u64,
    /// Points present in the index before the pass.
    pub indexed_points: u64,
    /// Rows re-streamed through the sync functions.
    pub synced_rows: u64,
    /// True when the index was unreachable and the pass was skipped.
    pub skipped: bool,
}

/// Keeps the vector index consistent with the relational store.
#[derive(Clone)]
pub struct SyncBridge {
    db: DbPool,
    vectors: VectorIndexService,
    embeddings: EmbeddingService,
}

impl SyncBridge {
    pub fn new(db: DbPool, vectors: VectorIndexService, embeddings: EmbeddingService) -> Self {
        Self {
            db,
            vectors,
            embeddings,
        }
    }

    // =========================================================================
    // Chunk decomposition (pure)
    // =========================================================================

    /// An observation decomposes into one summary chunk (title + subtitle +
    /// narrative) plus one chunk per fact: `1 + |facts|` chunks.
    pub fn chunks_for_observation(observation: &Observation) -> Vec<EmbedChunk> {
        let base = |id: String, text: String| EmbedChunk {
            id,
            doc_type: DocumentType::Observation,
            source_id: observation.id,
            project: observation.project.clone(),
            created_at_epoch: observation.created_at_epoch,
            text,
            kind: Some(observation.kind.as_str().to_string()),
            title: Some(observation.title.clone()),
            concepts: observation.concepts.clone(),
        };

        let mut chunks = vec![base(
            chunk_id(DocumentType::Observation, observation.id, "summary"),
            observation.summary_text(),
        )];

        for (i, fact) in observation.facts.iter().enumerate() {
            chunks.push(base(
                chunk_id_indexed(DocumentType::Observation, observation.id, "fact", i),
                fact.clone(),
            ));
        }

        chunks
    }

    /// A summary decomposes into one chunk per non-null text field.
    pub fn chunks_for_summary(summary: &SessionSummary) -> Vec<EmbedChunk> {
        summary
            .text_fields()
            .into_iter()
            .map(|(field, text)| EmbedChunk {
                id: chunk_id(DocumentType::SessionSummary, summary.id, field),
                doc_type: DocumentType::SessionSummary,
                source_id: summary.id,
                project: summary.project.clone(),
                created_at_epoch: summary.created_at_epoch,
                text: text.to_string(),
                kind: None,
                title: None,
                concepts: Vec::new(),
            })
            .collect()
    }

    /// A prompt is exactly one chunk.
    pub fn chunks_for_prompt(prompt: &UserPrompt) -> Vec<EmbedChunk> {
        vec![EmbedChunk {
            id: chunk_id(DocumentType::UserPrompt, prompt.id, "text"),
            doc_type: DocumentType::UserPrompt,
            source_id: prompt.id,
            project: String::new(),
            created_at_epoch: prompt.created_at_epoch,
            text: prompt.text.clone(),
            kind: None,
            title: None,
            concepts: Vec::new(),
        }]
    }

    // =========================================================================
    // Sync operations
    // =========================================================================

    pub async fn sync_observation(&self, observation: &Observation) -> Result<()> {
        self.upsert_chunks(Self::chunks_for_observation(observation))
            .await
    }

    pub async fn sync_summary(&self, summary: &SessionSummary) -> Result<()> {
        self.upsert_chunks(Self::chunks_for_summary(summary)).await
    }

    pub async fn sync_prompt(&self, prompt: &UserPrompt) -> Result<()> {
        self.upsert_chunks(Self::chunks_for_prompt(prompt)).await
    }

    /// Embed and upsert a chunk set. A failure here is the caller's to log;
    /// nothing in this path can corrupt the relational source of truth.
    async fn upsert_chunks(&self, chunks: Vec<EmbedChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed(&texts).await?;

        let points: Vec<VectorPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorPoint {
                payload: chunk_payload(&chunk),
                chunk_id: chunk.id,
                vector,
            })
            .collect();

        self.vectors.upsert(points).await
    }

    /// Fire-and-forget sync after an ingestion commit. The caller returns
    /// to its client immediately; a just-stored record may not be
    /// semantically searchable for a bounded moment.
    pub fn spawn_observation_sync(&self, observation: Observation) {
        let bridge = self.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge.sync_observation(&observation).await {
                warn!(observation_id = observation.id, error = %e, "Observation sync failed");
            }
        });
    }

    pub fn spawn_summary_sync(&self, summary: SessionSummary) {
        let bridge = self.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge.sync_summary(&summary).await {
                warn!(summary_id = summary.id, error = %e, "Summary sync failed");
            }
        });
    }

    pub fn spawn_prompt_sync(&self, prompt: UserPrompt) {
        let bridge = self.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge.sync_prompt(&prompt).await {
                warn!(prompt_id = prompt.id, error = %e, "Prompt sync failed");
            }
        });
    }

    // =========================================================================
    // Backfill
    // =========================================================================

    /// Rebuild the index when it is empty or behind the relational store.
    ///
    /// Safe to invoke concurrently with live syncing: every upsert is
    /// idempotent by chunk id, so overlapping passes converge.
    pub async fn ensure_backfilled(&self) -> Result<BackfillReport> {
        if !self.vectors.is_available() {
            warn!("Vector index unavailable - skipping backfill");
            return Ok(BackfillReport {
                skipped: true,
                ..Default::default()
            });
        }

        let expected = self.expected_chunk_count().await?;
        let indexed = self.vectors.count().await?;

        let mut report = BackfillReport {
            expected_chunks: expected,
            indexed_points: indexed,
            synced_rows: 0,
            skipped: false,
        };

        if indexed >= expected {
            debug!(expected, indexed, "Vector index up to date");
            return Ok(report);
        }

        info!(expected, indexed, "Vector index behind - backfilling");

        // Observations
        let mut after_id = 0;
        loop {
            let page = db::observations_page(&self.db, after_id, BACKFILL_BATCH_SIZE).await?;
            if page.is_empty() {
                break;
            }
            after_id = page.last().map(|o| o.id).unwrap_or(after_id);
            let chunks: Vec<EmbedChunk> =
                page.iter().flat_map(Self::chunks_for_observation).collect();
            report.synced_rows += page.len() as u64;
            if let Err(e) = self.upsert_chunks(chunks).await {
                warn!(error = %e, "Backfill batch failed (observations)");
            }
            info!(rows = report.synced_rows, "Backfill progress");
        }

        // Summaries
        let mut after_id = 0;
        loop {
            let page = db::summaries_page(&self.db, after_id, BACKFILL_BATCH_SIZE).await?;
            if page.is_empty() {
                break;
            }
            after_id = page.last().map(|s| s.id).unwrap_or(after_id);
            let chunks: Vec<EmbedChunk> = page.iter().flat_map(Self::chunks_for_summary).collect();
            report.synced_rows += page.len() as u64;
            if let Err(e) = self.upsert_chunks(chunks).await {
                warn!(error = %e, "Backfill batch failed (summaries)");
            }
        }

        // Prompts
        let mut after_id = 0;
        loop {
            let page = db::prompts_page(&self.db, after_id, BACKFILL_BATCH_SIZE).await?;
            if page.is_empty() {
                break;
            }
            after_id = page.last().map(|p| p.id).unwrap_or(after_id);
            let chunks: Vec<EmbedChunk> = page.iter().flat_map(Self::chunks_for_prompt).collect();
            report.synced_rows += page.len() as u64;
            if let Err(e) = self.upsert_chunks(chunks).await {
                warn!(error = %e, "Backfill batch failed (prompts)");
            }
        }

        info!(rows = report.synced_rows, "Backfill complete");

        Ok(report)
    }

    /// How many chunks the relational store should be represented by,
    /// computed in SQL so backfill detection stays cheap.
    async fn expected_chunk_count(&self) -> Result<u64> {
        let (obs_chunks,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(1 + json_array_length(facts)), 0) FROM observations",
        )
        .fetch_one(&self.db)
        .await?;

        let (summary_chunks,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(
                (request IS NOT NULL) + (investigated IS NOT NULL) + (learned IS NOT NULL) +
                (completed IS NOT NULL) + (next_steps IS NOT NULL) + (notes IS NOT NULL)
            ), 0) FROM session_summaries
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let (prompt_chunks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_prompts")
            .fetch_one(&self.db)
            .await?;

        Ok((obs_chunks + summary_chunks + prompt_chunks) as u64)
    }
}

/// Payload for one chunk: hydration back-reference plus the metadata the
/// index filters on.
fn chunk_payload(chunk: &EmbedChunk) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    payload.insert(KEY_DOC_TYPE.to_string(), json!(chunk.doc_type.as_str()));
    payload.insert(KEY_SOURCE_ID.to_string(), json!(chunk.source_id));
    payload.insert(KEY_PROJECT.to_string(), json!(chunk.project));
    payload.insert(KEY_EPOCH.to_string(), json!(chunk.created_at_epoch));
    if let Some(kind) = &chunk.kind {
        payload.insert(KEY_KIND.to_string(), json!(kind));
    }
    if let Some(title) = &chunk.title {
        payload.insert(KEY_TITLE.to_string(), json!(title));
    }
    if !chunk.concepts.is_empty() {
        payload.insert(KEY_CONCEPTS.to_string(), json!(chunk.concepts));
    }
    payload
}
