use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let db_size_bytes = state.store.db_size_bytes()?;
    Ok(Json(json!({
        "status": "ok",
        "uptime_s": state.started_at.elapsed().as_secs(),
        "db_size_bytes": db_size_bytes,
        "sse_clients": state.hub.client_count(),
    })))
}
