//! Hybrid retrieval engine.
//!
//! Two paths, selected by whether free-text query is present:
//!
//! - Path A (filter-only): straight to the relational store with the
//!   structured filters and date ordering. The only path that supports
//!   date-range filters, because the vector index's metadata predicates do
//!   not do range comparisons.
//! - Path B (semantic): embed the query, fetch nearest chunks, resolve the
//!   composite ids back to rows, hydrate from the relational store, apply
//!   structured filters and the recency horizon on the hydrated rows, then
//!   re-rank by the original vector order.
//!
//! When the vector index is unavailable or times out, Path B returns an
//! empty result set rather than substituting the keyword index: mixing
//! ranking semantics between backends produces inconsistent ordering. The
//! keyword index stays reachable through the explicit keyword mode only.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::config::SearchConfig;
use crate::db::{self, DateOrder, DbPool, ObservationFilters};
use crate::error::{Error, Result};
use crate::models::{parse_chunk_id, DocumentType, ObservationKind, RecordItem};
use crate::services::vector_index::{ChunkFilter, VectorIndexService};
use crate::services::EmbeddingService;

/// Result ordering preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    /// Vector-similarity rank order. Falls back to date (desc) on the
    /// filter-only path, where relevance is not defined.
    #[default]
    Relevance,
    DateDesc,
    DateAsc,
}

/// One search request, already parsed and validated by the API layer.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub doc_type: Option<DocumentType>,
    pub kind: Option<ObservationKind>,
    pub concept: Option<String>,
    pub file: Option<String>,
    pub date_start_epoch: Option<i64>,
    pub date_end_epoch: Option<i64>,
    pub project: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub order_by: OrderBy,
}

/// Query-time orchestrator over the vector index and the relational store.
#[derive(Clone)]
pub struct SearchService {
    db: DbPool,
    vectors: VectorIndexService,
    embeddings: EmbeddingService,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(
        db: DbPool,
        vectors: VectorIndexService,
        embeddings: EmbeddingService,
        config: SearchConfig,
    ) -> Self {
        Self {
            db,
            vectors,
            embeddings,
            config,
        }
    }

    /// Answer a search request with hydrated, ranked records.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<RecordItem>> {
        match query.query.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => self.search_semantic(text, query).await,
            _ => self.search_filtered(query).await,
        }
    }

    /// Resolve a free-text query to its single best observation id, for
    /// timeline anchoring. Goes through the same semantic path, so the
    /// recency horizon applies here too.
    pub async fn semantic_anchor(
        &self,
        text: &str,
        project: Option<&str>,
    ) -> Result<Option<i64>> {
        let query = SearchQuery {
            query: Some(text.to_string()),
            doc_type: Some(DocumentType::Observation),
            project: project.map(String::from),
            limit: 1,
            ..Default::default()
        };

        let items = self.search_semantic(text, &query).await?;
        Ok(items.first().map(|item| item.id()))
    }

    /// Explicit keyword mode over the full-text index. Results are ranked
    /// by bm25, hydrated from the relational store.
    pub async fn search_keyword(&self, text: &str, query: &SearchQuery) -> Result<Vec<RecordItem>> {
        let fetch = query.limit + query.offset;
        let hits = db::keyword_search(
            &self.db,
            text,
            query.doc_type,
            query.project.as_deref(),
            fetch.max(1),
        )
        .await?;

        let refs: Vec<(DocumentType, i64)> = hits
            .iter()
            .filter_map(|h| h.document_type().map(|d| (d, h.source_id)))
            .collect();

        let mut items = self.hydrate(&refs, query).await?;
        sort_items(&mut items, query.order_by, &rank_map(&refs));
        Ok(paginate(items, query.offset, query.limit))
    }

    // =========================================================================
    // Path A - filter-only
    // =========================================================================

    async fn search_filtered(&self, query: &SearchQuery) -> Result<Vec<RecordItem>> {
        let fetch = (query.limit + query.offset).max(1);
        let order = match query.order_by {
            // Relevance is undefined without a query; fall back to date
            OrderBy::Relevance | OrderBy::DateDesc => DateOrder::Desc,
            OrderBy::DateAsc => DateOrder::Asc,
        };

        let mut items: Vec<RecordItem> = Vec::new();

        if wants(query.doc_type, DocumentType::Observation) {
            let filters = ObservationFilters {
                project: query.project.clone(),
                kind: query.kind,
                concept: query.concept.clone(),
                file: query.file.clone(),
                date_start_epoch: query.date_start_epoch,
                date_end_epoch: query.date_end_epoch,
            };
            items.extend(
                db::list_observations(&self.db, &filters, order, fetch, 0)
                    .await?
                    .into_iter()
                    .map(RecordItem::Observation),
            );
        }

        if wants(query.doc_type, DocumentType::SessionSummary) {
            items.extend(
                db::list_summaries(
                    &self.db,
                    query.project.as_deref(),
                    query.date_start_epoch,
                    query.date_end_epoch,
                    order,
                    fetch,
                    0,
                )
                .await?
                .into_iter()
                .map(RecordItem::SessionSummary),
            );
        }

        if wants(query.doc_type, DocumentType::UserPrompt) {
            items.extend(
                db::list_prompts(
                    &self.db,
                    query.project.as_deref(),
                    query.date_start_epoch,
                    query.date_end_epoch,
                    order,
                    fetch,
                    0,
                )
                .await?
                .into_iter()
                .map(RecordItem::UserPrompt),
            );
        }

        sort_items(&mut items, query.order_by, &HashMap::new());
        Ok(paginate(items, query.offset, query.limit))
    }

    // =========================================================================
    // Path B - semantic
    // =========================================================================

    async fn search_semantic(&self, text: &str, query: &SearchQuery) -> Result<Vec<RecordItem>> {
        // 1. Embed and fetch candidates
        let vector = self.embeddings.embed_single(text).await?;

        let filter = ChunkFilter {
            doc_type: query.doc_type,
            project: query.project.clone(),
        };
        let hits = match self
            .vectors
            .search(vector, self.config.candidate_limit, Some(filter))
            .await
        {
            Ok(hits) => hits,
            Err(Error::VectorUnavailable(reason)) => {
                // Deliberate product decision: degrade to empty rather than
                // silently substituting the keyword index.
                warn!(
                    reason = %reason,
                    "Vector index unavailable - returning empty semantic results"
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        // 2. Resolve composite ids; dedupe rows matched via multiple
        //    chunks, keeping the closest occurrence's rank
        let mut refs: Vec<(DocumentType, i64)> = Vec::new();
        let mut seen: HashSet<(DocumentType, i64)> = HashSet::new();
        for hit in &hits {
            if let Some(pair) = parse_chunk_id(&hit.chunk_id) {
                if seen.insert(pair) {
                    refs.push(pair);
                }
            }
        }

        // 3. Partition by the caller's type filter
        if let Some(doc_type) = query.doc_type {
            refs.retain(|(d, _)| *d == doc_type);
        }

        // 4. Hydrate and post-filter (structured filters + recency horizon,
        //    all evaluated against relational rows)
        let ranks = rank_map(&refs);
        let mut items = self.hydrate(&refs, query).await?;

        let horizon_start = chrono::Utc::now().timestamp_millis()
            - self.config.recency_days * 24 * 60 * 60 * 1000;
        items.retain(|item| item.created_at_epoch() >= horizon_start);

        // 5. Re-rank: original vector order unless the caller asked for
        //    date ordering
        sort_items(&mut items, query.order_by, &ranks);

        // 6. Truncate
        Ok(paginate(items, query.offset, query.limit))
    }

    /// Batch-fetch full rows for resolved references, applying structured
    /// filters on the hydrated rows. Filters that do not apply to a row's
    /// document type are silently ignored for it.
    async fn hydrate(
        &self,
        refs: &[(DocumentType, i64)],
        query: &SearchQuery,
    ) -> Result<Vec<RecordItem>> {
        let obs_ids: Vec<i64> = refs
            .iter()
            .filter(|(d, _)| *d == DocumentType::Observation)
            .map(|(_, id)| *id)
            .collect();
        let summary_ids: Vec<i64> = refs
            .iter()
            .filter(|(d, _)| *d == DocumentType::SessionSummary)
            .map(|(_, id)| *id)
            .collect();
        let prompt_ids: Vec<i64> = refs
            .iter()
            .filter(|(d, _)| *d == DocumentType::UserPrompt)
            .map(|(_, id)| *id)
            .collect();

        let mut items = Vec::with_capacity(refs.len());

        for observation in db::get_observations_by_ids(&self.db, &obs_ids, None).await? {
            if let Some(kind) = query.kind {
                if observation.kind != kind {
                    continue;
                }
            }
            if let Some(concept) = &query.concept {
                if !observation.concepts.iter().any(|c| c == concept) {
                    continue;
                }
            }
            if let Some(file) = &query.file {
                let matches = observation
                    .files_read
                    .iter()
                    .chain(observation.files_modified.iter())
                    .any(|f| f.contains(file.as_str()));
                if !matches {
                    continue;
                }
            }
            if let Some(project) = &query.project {
                if &observation.project != project {
                    continue;
                }
            }
            items.push(RecordItem::Observation(observation));
        }

        for summary in db::get_summaries_by_ids(&self.db, &summary_ids, None).await? {
            if let Some(project) = &query.project {
                if &summary.project != project {
                    continue;
                }
            }
            items.push(RecordItem::SessionSummary(summary));
        }

        for prompt in db::get_prompts_by_ids(&self.db, &prompt_ids, None).await? {
            items.push(RecordItem::UserPrompt(prompt));
        }

        Ok(items)
    }
}

/// True when the caller's type filter admits this document type.
fn wants(filter: Option<DocumentType>, doc_type: DocumentType) -> bool {
    filter.map(|f| f == doc_type).unwrap_or(true)
}

fn rank_map(refs: &[(DocumentType, i64)]) -> HashMap<(DocumentType, i64), usize> {
    refs.iter()
        .enumerate()
        .map(|(rank, pair)| (*pair, rank))
        .collect()
}

fn sort_items(
    items: &mut [RecordItem],
    order_by: OrderBy,
    ranks: &HashMap<(DocumentType, i64), usize>,
) {
    match order_by {
        OrderBy::Relevance if !ranks.is_empty() => {
            items.sort_by_key(|item| {
                ranks
                    .get(&(item.doc_type(), item.id()))
                    .copied()
                    .unwrap_or(usize::MAX)
            });
        }
        OrderBy::Relevance | OrderBy::DateDesc => {
            items.sort_by_key(|item| (std::cmp::Reverse(item.created_at_epoch()), item.id()));
        }
        OrderBy::DateAsc => {
            items.sort_by_key(|item| (item.created_at_epoch(), item.id()));
        }
    }
}

fn paginate(items: Vec<RecordItem>, offset: usize, limit: usize) -> Vec<RecordItem> {
    items.into_iter().skip(offset).take(limit).collect()
}
