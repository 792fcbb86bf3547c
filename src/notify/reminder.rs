// src/notify/reminder.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// TTL gate against duplicate notifications.
///
/// An explicit injected store keyed by notification key (never a
/// process-wide set), so tests can reset it deterministically.
/// - First send for a key always allowed.
/// - Inside the TTL, repeats for the same key are suppressed.
/// - State is updated explicitly via `record` after a successful send.
#[derive(Debug, Default)]
pub struct ReminderGate {
    ttl: ChronoDuration,
    sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ReminderGate {
    /// `ttl_secs` < 0 is treated as 0 (no suppression).
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: ChronoDuration::seconds(ttl_secs.max(0)),
            sent: Mutex::new(HashMap::new()),
        }
    }

    /// Check if `key` may be sent at `now`. Does NOT mutate state.
    pub fn should_send(&self, key: &str, now: DateTime<Utc>) -> bool {
        let sent = self.sent.lock().expect("reminder mutex poisoned");
        match sent.get(key) {
            None => true,
            Some(ts) => now.signed_duration_since(*ts) >= self.ttl,
        }
    }

    /// Record that `key` was sent at `now`; prunes expired entries.
    pub fn record(&self, key: &str, now: DateTime<Utc>) {
        let mut sent = self.sent.lock().expect("reminder mutex poisoned");
        let ttl = self.ttl;
        sent.retain(|_, ts| now.signed_duration_since(*ts) < ttl);
        sent.insert(key.to_string(), now);
    }

    /// Forget everything (test hook).
    pub fn clear(&self) {
        self.sent.lock().expect("reminder mutex poisoned").clear();
    }
}
