//! Candidate fetch & enrichment.
//!
//! Pulls recent items from the store and turns them into scoring-ready
//! `Candidate`s: resolves the author's account age and the distinct
//! replier count. Read-only; no side effects.
//!
//! Enrichment failures are per-candidate, never per-batch:
//! - missing/failed author metadata skips that candidate (logged)
//! - a failed replier aggregation degrades that candidate to the cached
//!   raw reply count and leaves the anti-farm ratio check disabled

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::score::{Candidate, EngagementSignals};
use crate::store::{AuthorMeta, FeedStore};

/// Result of one fetch pass, with the counts the diagnostics report.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub candidates: Vec<Candidate>,
    /// Items read from the store before enrichment.
    pub fetched: usize,
    /// Items dropped because the author could not be resolved.
    pub skipped_missing_author: usize,
    /// Candidates whose replier signal fell back to the cached count.
    pub degraded_repliers: usize,
}

pub struct CandidateFetcher {
    store: Arc<dyn FeedStore>,
}

impl CandidateFetcher {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    /// Fetch and enrich candidates for the window ending at `now`.
    ///
    /// Store unavailability is the one fatal error here; everything
    /// after the initial read degrades per candidate.
    pub async fn fetch(
        &self,
        window_days: i64,
        cap: usize,
        now: DateTime<Utc>,
    ) -> Result<FetchOutcome> {
        let since = now - Duration::days(window_days.max(1));
        let items = self
            .store
            .recent_items(since, cap)
            .await
            .context("fetching recent items")?;

        let mut outcome = FetchOutcome {
            fetched: items.len(),
            ..Default::default()
        };

        // Authors repeat across items; resolve each once per batch.
        let mut author_cache: HashMap<String, Option<AuthorMeta>> = HashMap::new();

        for item in items {
            if !author_cache.contains_key(&item.author_id) {
                let fetched = match self.store.author_meta(&item.author_id).await {
                    Ok(meta) => meta,
                    Err(e) => {
                        tracing::warn!(
                            item = %item.id,
                            author = %item.author_id,
                            "author lookup failed, skipping candidate: {e:#}"
                        );
                        None
                    }
                };
                author_cache.insert(item.author_id.clone(), fetched);
            }
            let author = author_cache.get(&item.author_id).cloned().flatten();

            let Some(author) = author else {
                outcome.skipped_missing_author += 1;
                continue;
            };

            let unique_repliers = match self.store.unique_replier_count(&item.id).await {
                Ok(n) => Some(n),
                Err(e) => {
                    tracing::warn!(
                        item = %item.id,
                        "replier aggregation failed, using cached reply count: {e:#}"
                    );
                    outcome.degraded_repliers += 1;
                    None
                }
            };

            let age_secs = (now - author.created_at).num_seconds().max(0);
            let account_age_days = age_secs as f32 / 86_400.0;

            outcome.candidates.push(Candidate {
                id: item.id,
                author_id: item.author_id,
                content_type: item.content_type,
                created_at: item.created_at,
                signals: EngagementSignals {
                    upvotes: item.upvotes,
                    downvotes: item.downvotes,
                    replies: item.reply_count,
                    unique_repliers,
                    bookmarks: item.bookmarks,
                    reposts: item.reposts,
                },
                author_account_age_days: account_age_days,
            });
        }

        Ok(outcome)
    }
}
