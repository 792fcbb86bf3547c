//! Feed Ranker Service binary entrypoint.
//! Boots the Axum HTTP server, wiring the engine, shared state, and
//! middleware. Runs against the in-memory store; the production data
//! store is wired in by the embedding deployment.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use community_feed_ranker::contributor::ContributorConfig;
use community_feed_ranker::metrics::Metrics;
use community_feed_ranker::notify::NotifierMux;
use community_feed_ranker::score::{ScoringConfig, TimeBoostTable};
use community_feed_ranker::store::InMemoryStore;
use community_feed_ranker::{create_router, AppState, FeedEngine};

/// Enable compact tracing logs when FEED_DEV_LOG=1.
fn enable_tracing() {
    if std::env::var("FEED_DEV_LOG").ok().as_deref() != Some("1") && !cfg!(debug_assertions) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("community_feed_ranker=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_tracing();

    let scoring = ScoringConfig::load_default();
    let boost = TimeBoostTable::load_default();
    tracing::info!(version = %scoring.version(), "scoring config loaded");

    let metrics = Metrics::init(scoring.ranking.candidate_cap);

    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(NotifierMux::from_env());
    let engine = Arc::new(FeedEngine::new(
        store,
        scoring,
        boost,
        notifier,
        ContributorConfig::default(),
    ));

    let router = create_router(AppState::new(engine)).merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "feed ranker listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
