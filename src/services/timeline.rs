//! Timeline reconstructor.
//!
//! Given an anchor (observation id, session reference, timestamp, or a
//! free-text query resolved through the retrieval engine), computes a
//! symmetric window of surrounding records across all three record types
//! and returns them chronologically interleaved.
//!
//! Window boundaries for id anchors use id-based offsets, not timestamp
//! offsets: ids are assigned in strict insertion order even when a
//! sub-millisecond burst gives several observations the same epoch, so
//! "N records before/after" stays stable. The observation table is the
//! timing backbone throughout - it is denser than summaries or prompts.

use serde::Serialize;
use tracing::debug;

use crate::db::{self, DbPool};
use crate::error::{Error, Result};
use crate::models::RecordItem;
use crate::services::SearchService;

/// Reference point a timeline window is built around.
#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    /// A specific observation id.
    ObservationId(i64),
    /// A session's internal numeric id (`S<n>` on the wire).
    Session(i64),
    /// An epoch-millisecond timestamp.
    Timestamp(i64),
    /// Free text, resolved to the top semantic observation hit.
    Query(String),
}

impl Anchor {
    /// Parse the wire form: a bare integer is an observation id, `S<n>` is
    /// a session reference, anything RFC 3339 is a timestamp.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<i64>() {
            return Some(Self::ObservationId(id));
        }
        if let Some(rest) = raw.strip_prefix('S').or_else(|| raw.strip_prefix('s')) {
            if let Ok(id) = rest.parse::<i64>() {
                return Some(Self::Session(id));
            }
        }
        if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
            return Some(Self::Timestamp(ts.timestamp_millis()));
        }
        None
    }
}

/// A reconstructed timeline window.
#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    /// The observation id or epoch the window was anchored at, when one
    /// could be resolved.
    pub anchor_id: Option<i64>,
    pub start_epoch: i64,
    pub end_epoch: i64,
    /// Chronologically interleaved records, ascending by epoch.
    pub entries: Vec<RecordItem>,
}

impl Timeline {
    fn empty() -> Self {
        Self {
            anchor_id: None,
            start_epoch: 0,
            end_epoch: 0,
            entries: Vec::new(),
        }
    }
}

/// Pure read-side reconstruction over the current store state.
#[derive(Clone)]
pub struct TimelineService {
    db: DbPool,
    search: SearchService,
}

impl TimelineService {
    pub fn new(db: DbPool, search: SearchService) -> Self {
        Self { db, search }
    }

    /// Build the window around an anchor.
    ///
    /// Degenerate anchors (outside all data, or an empty table) produce an
    /// empty timeline, never an error. An anchor that names a record which
    /// does not exist is `NotFound`.
    pub async fn reconstruct(
        &self,
        anchor: Anchor,
        depth_before: usize,
        depth_after: usize,
        project: Option<&str>,
    ) -> Result<Timeline> {
        match anchor {
            Anchor::ObservationId(id) => {
                if db::get_observation(&self.db, id).await?.is_none() {
                    return Err(Error::NotFound(format!("observation {}", id)));
                }
                self.window_around_id(id, depth_before, depth_after, project)
                    .await
            }
            Anchor::Session(session_internal_id) => {
                let session = db::get_session(&self.db, session_internal_id)
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!("session {}", session_internal_id))
                    })?;

                // Anchor at the session's most recent summary; a session
                // with no summaries yet anchors at its creation time.
                let epoch = db::latest_summary_for_session(&self.db, &session.session_id)
                    .await?
                    .map(|s| s.created_at_epoch)
                    .unwrap_or(session.created_at_epoch);

                self.window_around_epoch(epoch, depth_before, depth_after, project)
                    .await
            }
            Anchor::Timestamp(epoch) => {
                self.window_around_epoch(epoch, depth_before, depth_after, project)
                    .await
            }
            Anchor::Query(text) => {
                match self.search.semantic_anchor(&text, project).await? {
                    Some(id) => {
                        self.window_around_id(id, depth_before, depth_after, project)
                            .await
                    }
                    // No semantic hit (or vector index down): empty window
                    None => {
                        debug!(query = %text, "No semantic anchor found");
                        Ok(Timeline::empty())
                    }
                }
            }
        }
    }

    /// Id-anchored window: boundary epochs come from up to depth+1
    /// observation ids on each side of the anchor.
    async fn window_around_id(
        &self,
        anchor_id: i64,
        depth_before: usize,
        depth_after: usize,
        project: Option<&str>,
    ) -> Result<Timeline> {
        let before =
            db::observation_epochs_before_id(&self.db, anchor_id, depth_before, project).await?;
        let after =
            db::observation_epochs_after_id(&self.db, anchor_id, depth_after, project).await?;

        self.fetch_window(Some(anchor_id), &before, &after, project)
            .await
    }

    /// Timestamp-anchored window: boundaries computed directly over epoch
    /// ordering, with the same before/after widening.
    async fn window_around_epoch(
        &self,
        anchor_epoch: i64,
        depth_before: usize,
        depth_after: usize,
        project: Option<&str>,
    ) -> Result<Timeline> {
        let before =
            db::observation_epochs_before_epoch(&self.db, anchor_epoch, depth_before, project)
                .await?;
        let after =
            db::observation_epochs_after_epoch(&self.db, anchor_epoch, depth_after, project)
                .await?;

        self.fetch_window(None, &before, &after, project).await
    }

    /// Take [start, end] from the boundary sets, then fetch and interleave
    /// all three record types.
    async fn fetch_window(
        &self,
        anchor_id: Option<i64>,
        before_epochs: &[i64],
        after_epochs: &[i64],
        project: Option<&str>,
    ) -> Result<Timeline> {
        // Both boundary fetches empty: the anchor sits outside all data
        if before_epochs.is_empty() && after_epochs.is_empty() {
            return Ok(Timeline {
                anchor_id,
                ..Timeline::empty()
            });
        }

        let candidates = before_epochs.iter().chain(after_epochs.iter());
        let start_epoch = candidates.clone().min().copied().unwrap_or(0);
        let end_epoch = candidates.max().copied().unwrap_or(i64::MAX);

        self.fetch_between(anchor_id, start_epoch, end_epoch, project)
            .await
    }

    async fn fetch_between(
        &self,
        anchor_id: Option<i64>,
        start_epoch: i64,
        end_epoch: i64,
        project: Option<&str>,
    ) -> Result<Timeline> {
        let observations = db::observations_between(&self.db, start_epoch, end_epoch, project);
        let summaries = db::summaries_between(&self.db, start_epoch, end_epoch, project);
        let prompts = db::prompts_between(&self.db, start_epoch, end_epoch, project);

        let (observations, summaries, prompts) =
            tokio::try_join!(observations, summaries, prompts)?;

        let mut entries: Vec<RecordItem> = Vec::new();
        entries.extend(observations.into_iter().map(RecordItem::Observation));
        entries.extend(summaries.into_iter().map(RecordItem::SessionSummary));
        entries.extend(prompts.into_iter().map(RecordItem::UserPrompt));

        // Ascending by epoch; equal epochs break deterministically by
        // per-type priority (prompt, observation, summary) then id.
        entries.sort_by_key(|e| (e.created_at_epoch(), e.merge_priority(), e.id()));

        Ok(Timeline {
            anchor_id,
            start_epoch,
            end_epoch,
            entries,
        })
    }
}
