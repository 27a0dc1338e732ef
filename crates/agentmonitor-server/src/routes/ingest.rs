use std::sync::Arc;

use agentmonitor_engine::{IngestStatus, contract};
use agentmonitor_types::FieldError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn ingest_one(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let raw: Value = serde_json::from_slice(&body).map_err(|_| {
        ApiError::InvalidPayload(vec![FieldError::new("body", "request body is not valid JSON")])
    })?;
    let raw = fill_branch(&state, raw).await;

    let outcome = state.ingestor.ingest_one(raw)?;
    for message in &outcome.messages {
        state.hub.publish(message);
    }

    let response = match outcome.status {
        IngestStatus::Created => (
            StatusCode::CREATED,
            Json(json!({
                "received": 1,
                "ids": outcome.id.into_iter().collect::<Vec<_>>(),
                "duplicates": 0,
            })),
        ),
        IngestStatus::Duplicate => (
            StatusCode::OK,
            Json(json!({"received": 0, "ids": [], "duplicates": 1})),
        ),
    };
    Ok(response)
}

pub async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let envelope: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::InvalidEnvelope("batch body is not valid JSON".to_string()))?;

    let outcome = state.ingestor.ingest_batch(envelope)?;
    for message in &outcome.messages {
        state.hub.publish(message);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "received": outcome.received,
            "ids": outcome.ids,
            "duplicates": outcome.duplicates,
            "rejected": outcome.rejected,
        })),
    ))
}

/// Annotate a payload that names a project but no branch with the
/// checkout's current branch. Best-effort and bounded by the resolver's
/// timeout; ingest never waits on git beyond that.
async fn fill_branch(state: &AppState, raw: Value) -> Value {
    let mut raw = contract::unwrap_double_encoded(raw);
    let Some(body) = raw.as_object_mut() else {
        return raw;
    };

    let has_branch = body
        .get("branch")
        .and_then(Value::as_str)
        .is_some_and(|b| !b.trim().is_empty());
    if has_branch {
        return raw;
    }

    let Some(project) = body
        .get("project")
        .and_then(Value::as_str)
        .map(|p| p.trim().to_string())
    else {
        return raw;
    };
    if let Some(branch) = state.branches.resolve(&project).await {
        body.insert("branch".to_string(), Value::String(branch));
    }
    raw
}
