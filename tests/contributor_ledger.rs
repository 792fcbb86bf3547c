// tests/contributor_ledger.rs
//
// The contributor ledger end-to-end: incremental upserts, the weekly
// recompute, promotion/retention notification variants, window dropout,
// per-user failure isolation, and the cooperative stop signal.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use community_feed_ranker::contributor::{
    ContributionEvent, ContributorConfig, ContributorLedger, StopSignal,
};
use community_feed_ranker::notify::{ContributorTransition, MemoryNotifier, NotifierMux};
use community_feed_ranker::store::{
    ContributorActivity, ContributorCounters, ContributorKey, FeedStore, InMemoryStore,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn key(user: &str) -> ContributorKey {
    ContributorKey::new(user, "community", None)
}

fn activity(user: &str, replies: u32, upvotes: u32, last_active: DateTime<Utc>) -> ContributorActivity {
    ContributorActivity {
        key: key(user),
        counters: ContributorCounters {
            replies_given: replies,
            upvotes_received: upvotes,
            helpful_marks: 0,
            zero_engagement_posts: 0,
        },
        last_active_at: last_active,
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    notifier: Arc<MemoryNotifier>,
    ledger: ContributorLedger,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let mux = Arc::new(NotifierMux::new().with(Box::new(ForwardingNotifier {
        inner: notifier.clone(),
    })));
    let ledger = ContributorLedger::new(store.clone(), mux, ContributorConfig::default());
    Harness {
        store,
        notifier,
        ledger,
    }
}

/// Bridges the mux's owned channel to a shared in-memory recorder.
struct ForwardingNotifier {
    inner: Arc<MemoryNotifier>,
}

#[async_trait::async_trait]
impl community_feed_ranker::notify::Notifier for ForwardingNotifier {
    async fn send(
        &self,
        notification: &community_feed_ranker::notify::Notification,
    ) -> anyhow::Result<()> {
        self.inner.send(notification).await
    }
}

#[tokio::test]
async fn incremental_events_accumulate_counters_and_score() {
    let h = harness();
    let k = key("u1");
    h.ledger
        .record_event(&k, ContributionEvent::ReplyGiven, now())
        .await
        .unwrap();
    h.ledger
        .record_event(&k, ContributionEvent::HelpfulMarkReceived, now())
        .await
        .unwrap();
    h.ledger
        .record_event(&k, ContributionEvent::ZeroEngagementPost, now())
        .await
        .unwrap();

    let rec = h.store.contributor(&k).await.unwrap().unwrap();
    assert_eq!(rec.counters.replies_given, 1);
    assert_eq!(rec.counters.helpful_marks, 1);
    assert_eq!(rec.counters.zero_engagement_posts, 1);
    let cfg = ContributorConfig::default();
    assert_eq!(
        rec.score,
        cfg.reply_weight + cfg.helpful_weight - cfg.zero_engagement_weight
    );
    // The incremental path never grants the flag.
    assert!(!rec.is_top_contributor);
}

#[tokio::test]
async fn recompute_flags_top_percentile_and_notifies_promotion() {
    let h = harness();
    for i in 0..10u32 {
        h.store
            .insert_activity(activity(&format!("u{i}"), 5, i * 10, now()));
    }

    let summary = h
        .ledger
        .recalculate_all(now(), &StopSignal::new())
        .await
        .unwrap();
    assert_eq!(summary.users_processed, 10);
    assert_eq!(summary.top_contributors_count, 1);
    assert!(summary.percentile_threshold.is_some());
    assert!(!summary.interrupted);

    let top = h.store.contributor(&key("u9")).await.unwrap().unwrap();
    assert!(top.is_top_contributor);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, "u9");
    assert_eq!(sent[0].transition(), Some(ContributorTransition::Promoted));
}

#[tokio::test]
async fn retained_flag_sends_the_still_top_variant() {
    let h = harness();
    for i in 0..10u32 {
        h.store
            .insert_activity(activity(&format!("u{i}"), 5, i * 10, now()));
    }
    h.ledger
        .recalculate_all(now(), &StopSignal::new())
        .await
        .unwrap();

    // A week later the same population recomputes; u9 stays on top.
    let later = now() + Duration::days(7);
    h.ledger
        .recalculate_all(later, &StopSignal::new())
        .await
        .unwrap();

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].transition(), Some(ContributorTransition::Promoted));
    assert_eq!(sent[1].transition(), Some(ContributorTransition::StillTop));
    assert_eq!(sent[1].user_id, "u9");
    // Nobody who was never promoted gets any notification.
    assert!(sent.iter().all(|n| n.user_id == "u9"));
}

#[tokio::test]
async fn dropping_out_of_the_window_clears_the_flag() {
    let h = harness();
    for i in 0..10u32 {
        h.store
            .insert_activity(activity(&format!("u{i}"), 5, i * 10, now()));
    }
    h.ledger
        .recalculate_all(now(), &StopSignal::new())
        .await
        .unwrap();
    assert!(h
        .store
        .contributor(&key("u9"))
        .await
        .unwrap()
        .unwrap()
        .is_top_contributor);

    // Next recompute runs far past u9's last activity; everyone else
    // stays active inside the window.
    let later = now() + Duration::days(120);
    for i in 0..9u32 {
        h.store
            .insert_activity(activity(&format!("u{i}"), 5, i * 10, later));
    }
    h.ledger
        .recalculate_all(later, &StopSignal::new())
        .await
        .unwrap();

    let dropped = h.store.contributor(&key("u9")).await.unwrap().unwrap();
    assert!(
        !dropped.is_top_contributor,
        "recency of activity is a hard requirement for the flag"
    );
}

#[tokio::test]
async fn one_failing_user_does_not_abort_the_batch() {
    let h = harness();
    for i in 0..5u32 {
        h.store
            .insert_activity(activity(&format!("u{i}"), 5, i * 10, now()));
    }
    h.store.break_contributor_writes("u2");

    let summary = h
        .ledger
        .recalculate_all(now(), &StopSignal::new())
        .await
        .unwrap();
    assert_eq!(summary.users_processed, 4);
    assert_eq!(summary.user_failures, 1);

    // The failed user's row was never written.
    assert!(h.store.contributor(&key("u2")).await.unwrap().is_none());
    // The others were.
    assert!(h.store.contributor(&key("u1")).await.unwrap().is_some());
}

#[tokio::test]
async fn triggered_stop_signal_interrupts_cleanly() {
    let h = harness();
    for i in 0..5u32 {
        h.store
            .insert_activity(activity(&format!("u{i}"), 5, i * 10, now()));
    }
    let stop = StopSignal::new();
    stop.trigger();

    let summary = h.ledger.recalculate_all(now(), &stop).await.unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.users_processed, 0);
}

#[tokio::test]
async fn offline_store_fails_the_recompute_explicitly() {
    let h = harness();
    h.store.set_offline(true);
    let err = h
        .ledger
        .recalculate_all(now(), &StopSignal::new())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("contributor activity"));
}

#[tokio::test]
async fn minimum_replies_gate_survives_end_to_end() {
    let h = harness();
    // Massive upvotes but too few replies given.
    h.store.insert_activity(activity("lurker", 3, 10_000, now()));
    h.store.insert_activity(activity("steady", 6, 20, now()));

    let summary = h
        .ledger
        .recalculate_all(now(), &StopSignal::new())
        .await
        .unwrap();
    assert_eq!(summary.top_contributors_count, 1);
    let lurker = h.store.contributor(&key("lurker")).await.unwrap().unwrap();
    assert!(!lurker.is_top_contributor);
    let steady = h.store.contributor(&key("steady")).await.unwrap().unwrap();
    assert!(steady.is_top_contributor);
}
