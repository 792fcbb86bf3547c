//! # Feed Engine
//! Orchestrates one explore-feed request: fetch → score → boost → rank.
//! Also the entry point for the contributor recompute and boost lookup,
//! so route handlers stay thin.
//!
//! The explore path never errors out to "no feed": expected failure
//! modes come back as an explicit status on the response object, with
//! diagnostics reflecting whatever was processed.

use chrono::{DateTime, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::contributor::{ContributorConfig, ContributorLedger, RecomputeSummary, StopSignal};
use crate::fetch::CandidateFetcher;
use crate::notify::NotifierMux;
use crate::rank::{rank, RankOptions, RankedItem};
use crate::score::decay::clamp01;
use crate::score::{ScoreBreakdown, Scorer, ScoringConfig, TimeBoostTable};
use crate::store::FeedStore;

/// Per-request correlation id: process-unique, cheap, no extra deps.
static REQ_SEQ: AtomicU64 = AtomicU64::new(0);
static START_NONCE: Lazy<u64> = Lazy::new(|| {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64
});

fn next_correlation_id() -> String {
    let seq = REQ_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("req-{:x}-{seq}", *START_NONCE)
}

pub const MAX_PAGE_LIMIT: usize = 100;
pub const DEFAULT_PAGE_LIMIT: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct ExploreRequest {
    /// Page size; clamped to [1, MAX_PAGE_LIMIT], 0 means default.
    pub limit: usize,
    pub cursor: Option<String>,
    /// Exclude this author's own items from their feed.
    pub exclude_user: Option<String>,
    /// Apply the time-of-day post-multiplier.
    pub apply_boost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Ok,
    StoreUnavailable,
}

/// Per-request counts, all tagged with the correlation id.
#[derive(Debug, Clone, Serialize)]
pub struct FeedDiagnostics {
    pub correlation_id: String,
    pub candidates_considered: usize,
    pub skipped_missing_author: usize,
    pub degraded_repliers: usize,
    pub surviving_floor: usize,
    pub surviving_author_cap: usize,
    pub returned: usize,
    pub scoring_version: String,
}

/// One feed item as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ExploreItem {
    pub id: String,
    pub author_id: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub score: f32,
    pub boost: f32,
    pub breakdown: ScoreBreakdown,
    pub scoring_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExploreResponse {
    pub status: FeedStatus,
    pub diagnostics: FeedDiagnostics,
    pub items: Vec<ExploreItem>,
    pub next_cursor: Option<String>,
}

pub struct FeedEngine {
    fetcher: CandidateFetcher,
    scorer: Scorer,
    boost_table: TimeBoostTable,
    ledger: ContributorLedger,
}

impl FeedEngine {
    pub fn new(
        store: Arc<dyn FeedStore>,
        scoring: ScoringConfig,
        boost_table: TimeBoostTable,
        notifier: Arc<NotifierMux>,
        contributor: ContributorConfig,
    ) -> Self {
        Self {
            fetcher: CandidateFetcher::new(store.clone()),
            scorer: Scorer::new(scoring),
            boost_table,
            ledger: ContributorLedger::new(store, notifier, contributor),
        }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn ledger(&self) -> &ContributorLedger {
        &self.ledger
    }

    /// Serve one explore-feed page at `now`.
    ///
    /// An empty result set is success. The only non-Ok status is an
    /// unreachable store, reported with zeroed diagnostics.
    pub async fn explore_feed(&self, req: &ExploreRequest, now: DateTime<Utc>) -> ExploreResponse {
        counter!("feed_requests_total").increment(1);
        let correlation_id = next_correlation_id();
        let cfg = self.scorer.config();
        let limit = if req.limit == 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            req.limit.min(MAX_PAGE_LIMIT)
        };

        let outcome = match self
            .fetcher
            .fetch(cfg.ranking.candidate_window_days, cfg.ranking.candidate_cap, now)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                counter!("feed_store_failures_total").increment(1);
                tracing::warn!(correlation = %correlation_id, "explore feed degraded: {e:#}");
                return ExploreResponse {
                    status: FeedStatus::StoreUnavailable,
                    diagnostics: FeedDiagnostics {
                        correlation_id,
                        candidates_considered: 0,
                        skipped_missing_author: 0,
                        degraded_repliers: 0,
                        surviving_floor: 0,
                        surviving_author_cap: 0,
                        returned: 0,
                        scoring_version: self.scorer.version().to_string(),
                    },
                    items: Vec::new(),
                    next_cursor: None,
                };
            }
        };
        counter!("feed_candidates_considered_total").increment(outcome.candidates.len() as u64);

        let scored: Vec<RankedItem> = outcome
            .candidates
            .into_iter()
            .map(|candidate| {
                let mut result = self.scorer.score(&candidate, now);
                let boost = if req.apply_boost {
                    self.boost_table.boost(&candidate.content_type, now)
                } else {
                    1.0
                };
                // Post-multiplier, re-clamped so published scores stay in [0,1].
                result.score = clamp01(result.score * boost);
                RankedItem {
                    candidate,
                    result,
                    boost,
                }
            })
            .collect();

        let opts = RankOptions {
            limit,
            cursor: req.cursor.clone(),
            exclude_author: req.exclude_user.clone(),
        };
        let (page, next_cursor, tallies) = rank(scored, &cfg.ranking, &opts);
        counter!("feed_items_returned_total").increment(page.len() as u64);

        let diagnostics = FeedDiagnostics {
            correlation_id: correlation_id.clone(),
            candidates_considered: tallies.considered,
            skipped_missing_author: outcome.skipped_missing_author,
            degraded_repliers: outcome.degraded_repliers,
            surviving_floor: tallies.surviving_floor,
            surviving_author_cap: tallies.surviving_author_cap,
            returned: tallies.returned,
            scoring_version: self.scorer.version().to_string(),
        };
        tracing::info!(
            correlation = %correlation_id,
            considered = tallies.considered,
            surviving_floor = tallies.surviving_floor,
            surviving_cap = tallies.surviving_author_cap,
            returned = tallies.returned,
            version = %diagnostics.scoring_version,
            "explore feed served"
        );

        let items = page
            .into_iter()
            .map(|it| ExploreItem {
                id: it.candidate.id,
                author_id: it.candidate.author_id,
                content_type: it.candidate.content_type,
                created_at: it.candidate.created_at,
                score: it.result.score,
                boost: it.boost,
                breakdown: it.result.breakdown,
                scoring_version: it.result.scoring_version,
            })
            .collect();

        ExploreResponse {
            status: FeedStatus::Ok,
            diagnostics,
            items,
            next_cursor,
        }
    }

    /// Full contributor recompute; meant to be driven by an external
    /// scheduler (weekly cron), not self-scheduling.
    pub async fn recalculate_contributors(
        &self,
        stop: &StopSignal,
    ) -> anyhow::Result<RecomputeSummary> {
        self.ledger.recalculate_all(Utc::now(), stop).await
    }

    /// Time-of-day boost lookup; `None` timestamp means now.
    pub fn time_boost(&self, content_type: &str, ts: Option<DateTime<Utc>>) -> f32 {
        self.boost_table
            .boost(content_type, ts.unwrap_or_else(Utc::now))
    }
}
