use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::contributor::{RecomputeSummary, StopSignal};
use crate::engine::{ExploreRequest, ExploreResponse, FeedEngine};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<FeedEngine>,
}

impl AppState {
    pub fn new(engine: Arc<FeedEngine>) -> Self {
        Self { engine }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/feed/explore", get(explore_feed))
        .route("/boost", get(time_boost))
        .route("/admin/recalculate-contributors", post(recalculate_contributors))
        .route("/debug/score-config", get(debug_score_config))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct ExploreQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    exclude_user: Option<String>,
    /// Time-of-day boost defaults to on.
    #[serde(default)]
    boost: Option<bool>,
}

async fn explore_feed(
    State(state): State<AppState>,
    Query(q): Query<ExploreQuery>,
) -> Json<ExploreResponse> {
    let req = ExploreRequest {
        limit: q.limit.unwrap_or(0),
        cursor: q.cursor,
        exclude_user: q.exclude_user,
        apply_boost: q.boost.unwrap_or(true),
    };
    Json(state.engine.explore_feed(&req, Utc::now()).await)
}

#[derive(Deserialize)]
struct BoostQuery {
    content_type: String,
    #[serde(default)]
    ts: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct BoostResp {
    content_type: String,
    multiplier: f32,
}

async fn time_boost(State(state): State<AppState>, Query(q): Query<BoostQuery>) -> Json<BoostResp> {
    let multiplier = state.engine.time_boost(&q.content_type, q.ts);
    Json(BoostResp {
        content_type: q.content_type,
        multiplier,
    })
}

async fn recalculate_contributors(
    State(state): State<AppState>,
) -> Result<Json<RecomputeSummary>, (StatusCode, String)> {
    let stop = StopSignal::new();
    match state.engine.recalculate_contributors(&stop).await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            tracing::warn!("contributor recompute failed: {e:#}");
            Err((StatusCode::BAD_GATEWAY, format!("recompute failed: {e:#}")))
        }
    }
}

#[derive(Serialize)]
struct ScoreConfigOut {
    label: String,
    version: String,
    half_life_hours: f32,
    max_per_author: usize,
    candidate_cap: usize,
}

async fn debug_score_config(State(state): State<AppState>) -> Json<ScoreConfigOut> {
    let cfg = state.engine.scorer().config();
    Json(ScoreConfigOut {
        label: cfg.label.clone(),
        version: state.engine.scorer().version().to_string(),
        half_life_hours: cfg.decay.half_life_hours,
        max_per_author: cfg.ranking.max_per_author,
        candidate_cap: cfg.ranking.candidate_cap,
    })
}
