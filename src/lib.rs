// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod contributor;
pub mod engine;
pub mod fetch;
pub mod metrics;
pub mod rank;
pub mod store;

// Scoring pipeline (decay, config, scoring, anti-farm, time boost)
pub mod score;

// Notifications (webhook channel, mux, reminder gate)
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::contributor::{
    ContributionEvent, ContributorConfig, ContributorLedger, RecomputeSummary, StopSignal,
};
pub use crate::engine::{ExploreRequest, ExploreResponse, FeedEngine, FeedStatus};
pub use crate::notify::{MemoryNotifier, Notification, Notifier, NotifierMux};
pub use crate::score::{Candidate, EngagementSignals, ScoringConfig, Scorer, TimeBoostTable};
pub use crate::store::{FeedStore, InMemoryStore};
