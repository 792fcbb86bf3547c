//! Contributor-status notifications.
//!
//! The dispatcher is fire-and-forget: `NotifierMux::notify` tries every
//! configured channel, logs failures, and never propagates them; a
//! missed notification must not roll back a score change.

pub mod reminder;
pub mod webhook;

use anyhow::Result;
use serde::Serialize;

/// Which contributor-status transition a notification announces. The
/// two variants carry different copy and must not be conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorTransition {
    Promoted,
    StillTop,
}

/// One outbound notification, shaped after the dispatcher contract:
/// `notify(userId, {title, body, data, category})`.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub data: serde_json::Value,
}

impl Notification {
    /// "Newly promoted" variant.
    pub fn promoted(user_id: &str, context_type: &str, score: i64, percentile: f32) -> Self {
        Self {
            user_id: user_id.to_string(),
            title: "You're now a Top Contributor!".to_string(),
            body: format!(
                "Your contributions in {context_type} put you among the community's most helpful voices. Thank you for building others up."
            ),
            category: "contributor_status".to_string(),
            data: serde_json::json!({
                "transition": ContributorTransition::Promoted,
                "context_type": context_type,
                "score": score,
                "percentile": percentile,
            }),
        }
    }

    /// "Still a top contributor" variant, emitted when the flag is
    /// retained across a recompute.
    pub fn still_top(user_id: &str, context_type: &str, score: i64, percentile: f32) -> Self {
        Self {
            user_id: user_id.to_string(),
            title: "Still a Top Contributor".to_string(),
            body: format!(
                "You kept your Top Contributor standing in {context_type} this week. Keep it up!"
            ),
            category: "contributor_status".to_string(),
            data: serde_json::json!({
                "transition": ContributorTransition::StillTop,
                "context_type": context_type,
                "score": score,
                "percentile": percentile,
            }),
        }
    }

    pub fn transition(&self) -> Option<ContributorTransition> {
        match self.data.get("transition").and_then(|v| v.as_str()) {
            Some("promoted") => Some(ContributorTransition::Promoted),
            Some("still_top") => Some(ContributorTransition::StillTop),
            _ => None,
        }
    }
}

/// One delivery channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Fan-out over every configured channel, best-effort.
#[derive(Default)]
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the environment: a webhook channel when
    /// `CONTRIBUTOR_WEBHOOK_URL` is set, otherwise no channels (sends
    /// become no-ops).
    pub fn from_env() -> Self {
        let mut mux = Self::new();
        if let Ok(url) = std::env::var(webhook::ENV_WEBHOOK_URL) {
            if !url.trim().is_empty() {
                mux = mux.with(Box::new(webhook::WebhookNotifier::new(url)));
            }
        }
        mux
    }

    pub fn with(mut self, channel: Box<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Send to every channel; failures are logged and swallowed.
    pub async fn notify(&self, notification: &Notification) {
        for channel in &self.channels {
            if let Err(e) = channel.send(notification).await {
                tracing::warn!(
                    user = %notification.user_id,
                    category = %notification.category,
                    "notification channel failed: {e:#}"
                );
            }
        }
    }
}

/// Test channel recording everything it was asked to send.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: std::sync::Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .expect("sent mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_carry_distinct_copy() {
        let p = Notification::promoted("u1", "community", 42, 95.0);
        let s = Notification::still_top("u1", "community", 42, 95.0);
        assert_ne!(p.title, s.title);
        assert_eq!(p.transition(), Some(ContributorTransition::Promoted));
        assert_eq!(s.transition(), Some(ContributorTransition::StillTop));
    }

    #[tokio::test]
    async fn mux_without_channels_is_a_noop() {
        let mux = NotifierMux::new();
        mux.notify(&Notification::promoted("u1", "community", 1, 50.0))
            .await;
    }

    #[tokio::test]
    async fn memory_notifier_records() {
        let mem = MemoryNotifier::new();
        mem.send(&Notification::promoted("u1", "community", 1, 50.0))
            .await
            .unwrap();
        assert_eq!(mem.sent().len(), 1);
        assert_eq!(mem.sent()[0].user_id, "u1");
    }
}
