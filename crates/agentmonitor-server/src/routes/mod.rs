//! Route surface: maps the external HTTP interface onto core
//! operations. All paths live under /api and speak JSON.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;

use crate::state::AppState;

mod health;
mod ingest;
mod otel;
mod queries;
mod stream;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/events",
            post(ingest::ingest_one).get(queries::list_events),
        )
        .route("/api/events/batch", post(ingest::ingest_batch))
        .route("/api/stats", get(queries::stats))
        .route("/api/stats/tools", get(queries::tool_stats))
        .route("/api/stats/cost", get(queries::cost_breakdown))
        .route("/api/stats/usage-monitor", get(queries::usage_monitor))
        .route("/api/sessions", get(queries::list_sessions))
        .route("/api/sessions/{id}", get(queries::session_detail))
        .route(
            "/api/sessions/{id}/transcript",
            get(queries::session_transcript),
        )
        .route("/api/filter-options", get(queries::filter_options))
        .route("/api/stream", get(stream::subscribe))
        .route("/api/health", get(health::health))
        .route("/api/otel/v1/logs", post(otel::logs))
        .route("/api/otel/v1/metrics", post(otel::metrics))
        .route("/api/otel/v1/traces", post(otel::traces))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
