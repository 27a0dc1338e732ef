//! Central error filter: converts internal error kinds into the JSON
//! response shapes of the API. Every error body is a JSON object with a
//! string `error` and optional `details`; there are no HTML error
//! pages.

use agentmonitor_types::FieldError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    /// Contract rejection; 400 with field-level details
    InvalidPayload(Vec<FieldError>),

    /// Malformed batch envelope; 400
    InvalidEnvelope(String),

    /// Unknown session on detail/transcript; 404
    NotFound(String),

    /// Non-JSON OTLP content; 415
    Unsupported(String),

    /// SSE registry full; 503 echoing the limit
    Saturated { max_clients: usize },

    /// Store I/O failure; 500, the server continues
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidPayload(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid payload", "details": details})),
            )
                .into_response(),
            ApiError::InvalidEnvelope(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": message})),
            )
                .into_response(),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("{what} not found")})),
            )
                .into_response(),
            ApiError::Unsupported(message) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Json(json!({"error": message})),
            )
                .into_response(),
            ApiError::Saturated { max_clients } => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "SSE client limit reached", "max_clients": max_clients})),
            )
                .into_response(),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal error"})),
                )
                    .into_response()
            }
        }
    }
}

impl From<agentmonitor_engine::Error> for ApiError {
    fn from(err: agentmonitor_engine::Error) -> Self {
        match err {
            agentmonitor_engine::Error::InvalidPayload(details) => ApiError::InvalidPayload(details),
            agentmonitor_engine::Error::InvalidEnvelope(message) => {
                ApiError::InvalidEnvelope(message)
            }
            agentmonitor_engine::Error::NotFound(what) => ApiError::NotFound(what),
            agentmonitor_engine::Error::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<agentmonitor_store::Error> for ApiError {
    fn from(err: agentmonitor_store::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
