//! Candidate scoring.
//!
//! `Scorer::score` is pure and deterministic: identical (candidate,
//! config, now) inputs always produce identical output. Pagination and
//! the test suite both depend on that.
//!
//! Final score = normalized weighted sum of five signals in [0,1],
//! multiplied by the anti-farm penalty, clamped to [0,1]. The replies
//! signal uses **unique repliers** rather than the raw reply count so a
//! single actor replying in a loop gains nothing.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::antifarm;
use super::config::ScoringConfig;
use super::decay::{clamp01, log_norm, net_likes, recency_score};

/// Raw engagement counters for one candidate.
///
/// `unique_repliers` is `None` when enrichment degraded; scoring then
/// falls back to the cached raw reply count and the anti-farm ratio
/// check is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngagementSignals {
    pub upvotes: u32,
    pub downvotes: u32,
    pub replies: u32,
    pub unique_repliers: Option<u32>,
    pub bookmarks: u32,
    pub reposts: u32,
}

impl EngagementSignals {
    /// Replier count used for the replies signal: unique repliers when
    /// resolved, cached raw count otherwise.
    pub fn repliers_for_scoring(&self) -> u32 {
        self.unique_repliers.unwrap_or(self.replies)
    }
}

/// One feed-eligible item, enriched and ready for scoring. Built fresh
/// per ranking call, never persisted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub author_id: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub signals: EngagementSignals,
    pub author_account_age_days: f32,
}

/// Per-signal sub-scores, each in [0,1], plus the penalty multiplier.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreBreakdown {
    pub recency: f32,
    pub replies: f32,
    pub bookmarks: f32,
    pub reposts: f32,
    pub likes: f32,
    pub penalty: f32,
}

/// Final score in [0,1] with its breakdown and the config version that
/// produced it.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreResult {
    pub score: f32,
    pub breakdown: ScoreBreakdown,
    pub scoring_version: String,
}

/// Scorer bound to one immutable config. The version tag is derived
/// once at construction.
#[derive(Debug, Clone)]
pub struct Scorer {
    config: ScoringConfig,
    version: String,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        let version = config.version();
        Self { config, version }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Score one candidate at `now`.
    pub fn score(&self, candidate: &Candidate, now: DateTime<Utc>) -> ScoreResult {
        let cfg = &self.config;

        let age_secs = (now - candidate.created_at).num_seconds().max(0);
        let age_hours = age_secs as f32 / 3600.0;

        let recency = recency_score(age_hours, cfg.decay.half_life_hours, cfg.decay.recency_floor);
        let replies = log_norm(
            candidate.signals.repliers_for_scoring() as u64,
            cfg.scales.replies,
        );
        let bookmarks = log_norm(candidate.signals.bookmarks as u64, cfg.scales.bookmarks);
        let reposts = log_norm(candidate.signals.reposts as u64, cfg.scales.reposts);
        let likes = log_norm(
            net_likes(candidate.signals.upvotes, candidate.signals.downvotes) as u64,
            cfg.scales.likes,
        );

        let w = &cfg.weights;
        let raw = recency * w.recency
            + replies * w.replies
            + bookmarks * w.bookmarks
            + reposts * w.reposts
            + likes * w.likes;
        let denom = (w.recency + w.replies + w.bookmarks + w.reposts + w.likes).max(1e-6);

        let penalty = antifarm::penalty(
            &candidate.signals,
            candidate.author_account_age_days,
            &cfg.anti_farm,
        );

        let score = clamp01((raw / denom) * penalty);

        ScoreResult {
            score,
            breakdown: ScoreBreakdown {
                recency,
                replies,
                bookmarks,
                reposts,
                likes,
                penalty,
            },
            scoring_version: self.version.clone(),
        }
    }
}
