//! # Data-store boundary
//!
//! The relational store is an external collaborator; this module defines
//! the typed records and the `FeedStore` trait the engine consumes, plus
//! an in-memory implementation used by the dev binary and the tests.
//!
//! Everything crossing this boundary is an explicit struct, no untyped
//! rows. Validation of raw storage happens behind the trait, not in the
//! scoring code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One stored feed item, as the store reports it. `reply_count` is the
/// cached raw total, kept as the degraded fallback for the
/// unique-replier signal.
#[derive(Debug, Clone)]
pub struct StoredItem {
    pub id: String,
    pub author_id: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
    pub upvotes: u32,
    pub downvotes: u32,
    pub reply_count: u32,
    pub bookmarks: u32,
    pub reposts: u32,
}

/// Author metadata needed for scoring: identity and account creation.
#[derive(Debug, Clone)]
pub struct AuthorMeta {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Key of one contributor-score row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContributorKey {
    pub user_id: String,
    pub context_type: String,
    pub context_id: Option<String>,
}

impl ContributorKey {
    pub fn new(
        user_id: impl Into<String>,
        context_type: impl Into<String>,
        context_id: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            context_type: context_type.into(),
            context_id,
        }
    }
}

/// Rolling-window counters for one contributor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContributorCounters {
    pub replies_given: u32,
    pub upvotes_received: u32,
    pub helpful_marks: u32,
    pub zero_engagement_posts: u32,
}

impl ContributorCounters {
    pub fn add(&mut self, other: &ContributorCounters) {
        self.replies_given += other.replies_given;
        self.upvotes_received += other.upvotes_received;
        self.helpful_marks += other.helpful_marks;
        self.zero_engagement_posts += other.zero_engagement_posts;
    }
}

/// Persisted contributor-score row.
#[derive(Debug, Clone)]
pub struct ContributorRecord {
    pub key: ContributorKey,
    pub counters: ContributorCounters,
    pub score: i64,
    pub is_top_contributor: bool,
    pub percentile: f32,
    pub last_active_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContributorRecord {
    pub fn new(key: ContributorKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            counters: ContributorCounters::default(),
            score: 0,
            is_top_contributor: false,
            percentile: 0.0,
            last_active_at: at,
            updated_at: at,
        }
    }
}

/// Ground-truth activity for one contributor over the recompute window.
#[derive(Debug, Clone)]
pub struct ContributorActivity {
    pub key: ContributorKey,
    pub counters: ContributorCounters,
    pub last_active_at: DateTime<Utc>,
}

/// Read/write contract against the external data store.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Recent non-deleted items, newest first, hard-capped.
    async fn recent_items(&self, since: DateTime<Utc>, cap: usize) -> Result<Vec<StoredItem>>;

    /// Author metadata; `None` for unknown authors.
    async fn author_meta(&self, author_id: &str) -> Result<Option<AuthorMeta>>;

    /// Count of distinct authors who replied to the item.
    async fn unique_replier_count(&self, item_id: &str) -> Result<u32>;

    /// Atomic insert-or-add of counters and score delta for one
    /// contributor row. Must not lose concurrent increments.
    async fn add_contributor_counters(
        &self,
        key: &ContributorKey,
        delta: ContributorCounters,
        score_delta: i64,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Authoritative full overwrite of one contributor row.
    async fn put_contributor(&self, record: ContributorRecord) -> Result<()>;

    /// Fetch one contributor row.
    async fn contributor(&self, key: &ContributorKey) -> Result<Option<ContributorRecord>>;

    /// All rows currently holding the top-contributor flag.
    async fn top_contributors(&self) -> Result<Vec<ContributorRecord>>;

    /// Ground-truth activity per contributor since `since`.
    async fn contributor_activity(&self, since: DateTime<Utc>)
        -> Result<Vec<ContributorActivity>>;
}

/// In-memory store. Backs the dev binary and every test; the production
/// store lives outside this crate.
#[derive(Default)]
pub struct InMemoryStore {
    items: Mutex<Vec<StoredItem>>,
    authors: Mutex<HashMap<String, AuthorMeta>>,
    unique_repliers: Mutex<HashMap<String, u32>>,
    contributors: Mutex<HashMap<ContributorKey, ContributorRecord>>,
    activity: Mutex<Vec<ContributorActivity>>,
    // Test-only fault injection.
    offline: AtomicBool,
    broken_replier_lookups: Mutex<HashSet<String>>,
    broken_contributor_writes: Mutex<HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&self, item: StoredItem) {
        self.items.lock().expect("items mutex poisoned").push(item);
    }

    pub fn insert_author(&self, author: AuthorMeta) {
        self.authors
            .lock()
            .expect("authors mutex poisoned")
            .insert(author.id.clone(), author);
    }

    pub fn set_unique_repliers(&self, item_id: &str, count: u32) {
        self.unique_repliers
            .lock()
            .expect("repliers mutex poisoned")
            .insert(item_id.to_string(), count);
    }

    pub fn insert_activity(&self, activity: ContributorActivity) {
        self.activity
            .lock()
            .expect("activity mutex poisoned")
            .push(activity);
    }

    /// Simulate the whole store being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make replier lookups for one item fail (degraded enrichment).
    pub fn break_replier_lookup(&self, item_id: &str) {
        self.broken_replier_lookups
            .lock()
            .expect("broken mutex poisoned")
            .insert(item_id.to_string());
    }

    /// Make contributor writes for one user fail (batch-item failure).
    pub fn break_contributor_writes(&self, user_id: &str) {
        self.broken_contributor_writes
            .lock()
            .expect("broken mutex poisoned")
            .insert(user_id.to_string());
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(anyhow!("store unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FeedStore for InMemoryStore {
    async fn recent_items(&self, since: DateTime<Utc>, cap: usize) -> Result<Vec<StoredItem>> {
        self.check_online()?;
        let items = self.items.lock().expect("items mutex poisoned");
        let mut out: Vec<StoredItem> = items
            .iter()
            .filter(|it| !it.deleted && it.created_at >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out.truncate(cap);
        Ok(out)
    }

    async fn author_meta(&self, author_id: &str) -> Result<Option<AuthorMeta>> {
        self.check_online()?;
        Ok(self
            .authors
            .lock()
            .expect("authors mutex poisoned")
            .get(author_id)
            .cloned())
    }

    async fn unique_replier_count(&self, item_id: &str) -> Result<u32> {
        self.check_online()?;
        if self
            .broken_replier_lookups
            .lock()
            .expect("broken mutex poisoned")
            .contains(item_id)
        {
            return Err(anyhow!("replier aggregation failed for {item_id}"));
        }
        Ok(self
            .unique_repliers
            .lock()
            .expect("repliers mutex poisoned")
            .get(item_id)
            .copied()
            .unwrap_or(0))
    }

    async fn add_contributor_counters(
        &self,
        key: &ContributorKey,
        delta: ContributorCounters,
        score_delta: i64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_online()?;
        let mut map = self.contributors.lock().expect("contributors mutex poisoned");
        let rec = map
            .entry(key.clone())
            .or_insert_with(|| ContributorRecord::new(key.clone(), at));
        rec.counters.add(&delta);
        rec.score = (rec.score + score_delta).max(0);
        rec.last_active_at = rec.last_active_at.max(at);
        rec.updated_at = at;
        Ok(())
    }

    async fn put_contributor(&self, record: ContributorRecord) -> Result<()> {
        self.check_online()?;
        if self
            .broken_contributor_writes
            .lock()
            .expect("broken mutex poisoned")
            .contains(&record.key.user_id)
        {
            return Err(anyhow!(
                "contributor write failed for {}",
                record.key.user_id
            ));
        }
        self.contributors
            .lock()
            .expect("contributors mutex poisoned")
            .insert(record.key.clone(), record);
        Ok(())
    }

    async fn contributor(&self, key: &ContributorKey) -> Result<Option<ContributorRecord>> {
        self.check_online()?;
        Ok(self
            .contributors
            .lock()
            .expect("contributors mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn top_contributors(&self) -> Result<Vec<ContributorRecord>> {
        self.check_online()?;
        Ok(self
            .contributors
            .lock()
            .expect("contributors mutex poisoned")
            .values()
            .filter(|r| r.is_top_contributor)
            .cloned()
            .collect())
    }

    async fn contributor_activity(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContributorActivity>> {
        self.check_online()?;
        Ok(self
            .activity
            .lock()
            .expect("activity mutex poisoned")
            .iter()
            .filter(|a| a.last_active_at >= since)
            .cloned()
            .collect())
    }
}
