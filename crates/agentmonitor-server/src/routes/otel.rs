use std::sync::Arc;

use agentmonitor_engine::otel;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let envelope = parse_json_envelope(&headers, &body)?;
    let payloads = otel::log_payloads(&envelope);
    ingest_payloads(&state, payloads);
    Ok(Json(json!({})))
}

pub async fn metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let envelope = parse_json_envelope(&headers, &body)?;
    let payloads = {
        let mut tracker = state.deltas.lock().expect("delta tracker poisoned");
        otel::metric_payloads(&mut tracker, &envelope)
    };
    ingest_payloads(&state, payloads);
    Ok(Json(json!({})))
}

pub async fn traces() -> impl IntoResponse {
    Json(json!({}))
}

/// Only the JSON encoding of OTLP is accepted; a protobuf body gets a
/// 415 rather than a parse error.
fn parse_json_envelope(headers: &HeaderMap, body: &Bytes) -> Result<Value, ApiError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
    if !is_json {
        return Err(ApiError::Unsupported(
            "OTLP protobuf is not supported; send application/json".to_string(),
        ));
    }
    serde_json::from_slice(body)
        .map_err(|_| ApiError::InvalidEnvelope("OTLP body is not valid JSON".to_string()))
}

/// Feed extracted payloads through the ordinary ingest path. Individual
/// rejections are logged and skipped; the exporter is not the party
/// that can fix them.
fn ingest_payloads(state: &AppState, payloads: Vec<Value>) {
    for payload in payloads {
        match state.ingestor.ingest_one(payload) {
            Ok(outcome) => {
                for message in &outcome.messages {
                    state.hub.publish(message);
                }
            }
            Err(err) => tracing::warn!(error = %err, "otel payload rejected"),
        }
    }
}
