//! # Contributor score ledger
//!
//! A longer-horizon scoring loop, separate from feed ranking: it
//! aggregates each user's community contributions into a rolling score
//! and flags the top percentile of currently-active contributors.
//!
//! Two write paths share the per-user row:
//! - the **incremental** path adds counters through an atomic additive
//!   upsert on every qualifying event, keeping displayed scores timely;
//! - the **batch** path (external scheduler, e.g. weekly) recomputes
//!   everything from ground truth over the rolling window and overwrites
//!   rows authoritatively. If the two race, the next batch pass wins;
//!   strict serializability is not required.
//!
//! `compute_standings` is the pure core: no I/O, fully unit-testable,
//! the same split the scoring pipeline uses.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::notify::reminder::ReminderGate;
use crate::notify::{Notification, NotifierMux};
use crate::store::{ContributorActivity, ContributorCounters, ContributorKey, ContributorRecord, FeedStore};

/// Ledger parameters. Counter weights are engineering defaults, kept
/// configurable like the scoring weights.
#[derive(Debug, Clone, Copy)]
pub struct ContributorConfig {
    /// Rolling ground-truth window for the batch recompute.
    pub window_days: i64,
    /// Share of eligible users flagged as top contributors.
    pub top_percentile: f32,
    /// Minimum replies given to even be eligible.
    pub minimum_replies: u32,
    pub reply_weight: i64,
    pub upvote_weight: i64,
    pub helpful_weight: i64,
    /// Subtracted per zero-engagement post.
    pub zero_engagement_weight: i64,
    /// TTL for the duplicate-notification gate.
    pub reminder_ttl_secs: i64,
}

impl Default for ContributorConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            top_percentile: 10.0,
            minimum_replies: 5,
            reply_weight: 2,
            upvote_weight: 1,
            helpful_weight: 5,
            zero_engagement_weight: 1,
            reminder_ttl_secs: 6 * 24 * 3600,
        }
    }
}

/// One qualifying contribution event (incremental path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionEvent {
    ReplyGiven,
    UpvoteReceived,
    HelpfulMarkReceived,
    ZeroEngagementPost,
}

/// Cooperative stop signal: the batch checks it between users, so a
/// long run can be stopped without corrupting partially-written state.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary returned to the external scheduler.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecomputeSummary {
    pub users_processed: usize,
    pub user_failures: usize,
    pub top_contributors_count: usize,
    /// Score cutoff for the flag; `None` when nobody qualified.
    pub percentile_threshold: Option<i64>,
    pub interrupted: bool,
    pub calculated_at: DateTime<Utc>,
}

/// Derived score: weighted counters, floored at zero.
pub fn contribution_score(counters: &ContributorCounters, cfg: &ContributorConfig) -> i64 {
    let positive = counters.replies_given as i64 * cfg.reply_weight
        + counters.upvotes_received as i64 * cfg.upvote_weight
        + counters.helpful_marks as i64 * cfg.helpful_weight;
    let negative = counters.zero_engagement_posts as i64 * cfg.zero_engagement_weight;
    (positive - negative).max(0)
}

/// One user's recomputed standing.
#[derive(Debug, Clone)]
pub struct Standing {
    pub key: ContributorKey,
    pub counters: ContributorCounters,
    pub score: i64,
    pub eligible: bool,
    pub is_top: bool,
    pub percentile: f32,
    pub last_active_at: DateTime<Utc>,
}

/// All standings for one recompute, plus the threshold that was applied.
#[derive(Debug, Clone)]
pub struct Standings {
    pub entries: Vec<Standing>,
    pub threshold: Option<i64>,
}

/// Pure recompute core over ground-truth activity.
///
/// Eligibility needs `minimum_replies` replies given. The flag cutoff is
/// the k-th highest eligible score for `k = ceil(n * pct / 100)`; when a
/// tie block at that score would push the flagged count past `k`, the
/// threshold moves up past the ties, so at most `k` users are flagged.
pub fn compute_standings(activity: &[ContributorActivity], cfg: &ContributorConfig) -> Standings {
    let mut entries: Vec<Standing> = activity
        .iter()
        .map(|a| {
            let score = contribution_score(&a.counters, cfg);
            Standing {
                key: a.key.clone(),
                counters: a.counters,
                score,
                eligible: a.counters.replies_given >= cfg.minimum_replies,
                is_top: false,
                percentile: 0.0,
                last_active_at: a.last_active_at,
            }
        })
        .collect();

    let mut eligible_scores: Vec<i64> = entries
        .iter()
        .filter(|e| e.eligible)
        .map(|e| e.score)
        .collect();
    eligible_scores.sort_unstable_by(|a, b| b.cmp(a));

    let n = eligible_scores.len();
    let threshold = if n == 0 {
        None
    } else {
        let pct = cfg.top_percentile.clamp(0.0, 100.0);
        let k = ((n as f32 * pct / 100.0).ceil() as usize).max(1);
        let kth = eligible_scores[k - 1];
        let at_or_above = eligible_scores.iter().filter(|&&s| s >= kth).count();
        if at_or_above <= k {
            Some(kth)
        } else {
            // Ties at the cutoff: raise the bar to the smallest score
            // strictly above them, flagging fewer than k.
            eligible_scores
                .iter()
                .copied()
                .take_while(|&s| s > kth)
                .last()
        }
    };

    for entry in entries.iter_mut() {
        if !entry.eligible {
            continue;
        }
        if let Some(threshold) = threshold {
            entry.is_top = entry.score >= threshold;
        }
        let at_or_below = eligible_scores.iter().filter(|&&s| s <= entry.score).count();
        entry.percentile = ((at_or_below as f32 / n as f32) * 1000.0).round() / 10.0;
    }

    Standings { entries, threshold }
}

/// The ledger: incremental updates, batch recompute, notifications.
pub struct ContributorLedger {
    store: Arc<dyn FeedStore>,
    notifier: Arc<NotifierMux>,
    reminders: Arc<ReminderGate>,
    config: ContributorConfig,
}

impl ContributorLedger {
    pub fn new(
        store: Arc<dyn FeedStore>,
        notifier: Arc<NotifierMux>,
        config: ContributorConfig,
    ) -> Self {
        let reminders = Arc::new(ReminderGate::new(config.reminder_ttl_secs));
        Self {
            store,
            notifier,
            reminders,
            config,
        }
    }

    /// Inject a shared reminder gate (tests reset it between cases).
    pub fn with_reminder_gate(mut self, gate: Arc<ReminderGate>) -> Self {
        self.reminders = gate;
        self
    }

    pub fn config(&self) -> &ContributorConfig {
        &self.config
    }

    /// Incremental fast path: fold one event into the user's row via
    /// the store's atomic additive upsert. Never touches the
    /// top-contributor flag; only the batch pass decides that.
    pub async fn record_event(
        &self,
        key: &ContributorKey,
        event: ContributionEvent,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut delta = ContributorCounters::default();
        let score_delta = match event {
            ContributionEvent::ReplyGiven => {
                delta.replies_given = 1;
                self.config.reply_weight
            }
            ContributionEvent::UpvoteReceived => {
                delta.upvotes_received = 1;
                self.config.upvote_weight
            }
            ContributionEvent::HelpfulMarkReceived => {
                delta.helpful_marks = 1;
                self.config.helpful_weight
            }
            ContributionEvent::ZeroEngagementPost => {
                delta.zero_engagement_posts = 1;
                -self.config.zero_engagement_weight
            }
        };
        self.store
            .add_contributor_counters(key, delta, score_delta, at)
            .await
            .context("incremental contributor upsert")
    }

    /// Batch recompute over the rolling window. Authoritative: every
    /// processed row is fully overwritten. One user's failure never
    /// aborts the batch; their prior row stays until the next pass.
    pub async fn recalculate_all(
        &self,
        now: DateTime<Utc>,
        stop: &StopSignal,
    ) -> Result<RecomputeSummary> {
        counter!("contributor_recompute_runs_total").increment(1);

        let since = now - Duration::days(self.config.window_days.max(1));
        let activity = self
            .store
            .contributor_activity(since)
            .await
            .context("fetching contributor activity")?;

        let standings = compute_standings(&activity, &self.config);

        let mut summary = RecomputeSummary {
            users_processed: 0,
            user_failures: 0,
            top_contributors_count: 0,
            percentile_threshold: standings.threshold,
            interrupted: false,
            calculated_at: now,
        };

        let mut active_keys: HashSet<ContributorKey> = HashSet::new();

        for standing in &standings.entries {
            if stop.is_triggered() {
                summary.interrupted = true;
                break;
            }
            active_keys.insert(standing.key.clone());

            match self.apply_standing(standing, now).await {
                Ok(()) => {
                    summary.users_processed += 1;
                    if standing.is_top {
                        summary.top_contributors_count += 1;
                    }
                }
                Err(e) => {
                    summary.user_failures += 1;
                    counter!("contributor_recompute_user_failures_total").increment(1);
                    tracing::warn!(
                        user = %standing.key.user_id,
                        context = %standing.key.context_type,
                        "contributor recompute failed for user, prior state kept: {e:#}"
                    );
                }
            }
        }

        if !summary.interrupted {
            if let Err(e) = self.clear_dropped_flags(&active_keys, now, stop).await {
                tracing::warn!("clearing dropped top-contributor flags failed: {e:#}");
            }
        }

        gauge!("contributor_top_count").set(summary.top_contributors_count as f64);
        tracing::info!(
            users = summary.users_processed,
            failures = summary.user_failures,
            top = summary.top_contributors_count,
            threshold = ?summary.percentile_threshold,
            interrupted = summary.interrupted,
            "contributor recompute finished"
        );

        Ok(summary)
    }

    /// Overwrite one user's row and emit the right status notification.
    async fn apply_standing(&self, standing: &Standing, now: DateTime<Utc>) -> Result<()> {
        let previous = self.store.contributor(&standing.key).await?;
        let was_top = previous.map(|p| p.is_top_contributor).unwrap_or(false);

        self.store
            .put_contributor(ContributorRecord {
                key: standing.key.clone(),
                counters: standing.counters,
                score: standing.score,
                is_top_contributor: standing.is_top,
                percentile: standing.percentile,
                last_active_at: standing.last_active_at,
                updated_at: now,
            })
            .await?;

        // Notify only after the row is durably updated.
        if standing.is_top {
            let (notification, variant) = if was_top {
                (
                    Notification::still_top(
                        &standing.key.user_id,
                        &standing.key.context_type,
                        standing.score,
                        standing.percentile,
                    ),
                    "still_top",
                )
            } else {
                (
                    Notification::promoted(
                        &standing.key.user_id,
                        &standing.key.context_type,
                        standing.score,
                        standing.percentile,
                    ),
                    "promoted",
                )
            };
            let gate_key = format!(
                "{}:{}:{variant}",
                standing.key.user_id, standing.key.context_type
            );
            if self.reminders.should_send(&gate_key, now) {
                self.notifier.notify(&notification).await;
                self.reminders.record(&gate_key, now);
            } else {
                tracing::debug!(key = %gate_key, "suppressed duplicate contributor notification");
            }
        }

        Ok(())
    }

    /// Recency of activity is a hard requirement: whoever holds the
    /// flag but is absent from the current window loses it, whatever
    /// their last score was.
    async fn clear_dropped_flags(
        &self,
        active: &HashSet<ContributorKey>,
        now: DateTime<Utc>,
        stop: &StopSignal,
    ) -> Result<()> {
        let flagged = self.store.top_contributors().await?;
        for mut record in flagged {
            if stop.is_triggered() {
                break;
            }
            if active.contains(&record.key) {
                continue;
            }
            record.is_top_contributor = false;
            record.percentile = 0.0;
            record.updated_at = now;
            if let Err(e) = self.store.put_contributor(record.clone()).await {
                tracing::warn!(
                    user = %record.key.user_id,
                    "clearing stale top-contributor flag failed: {e:#}"
                );
            }
        }
        Ok(())
    }
}
