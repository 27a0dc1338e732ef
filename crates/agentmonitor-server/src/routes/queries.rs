use std::sync::Arc;

use agentmonitor_engine::{transcript, usage_reports};
use agentmonitor_store::StatsScope;
use agentmonitor_types::{EventQuery, SessionQuery};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

const SESSION_DETAIL_EVENTS: u32 = 100;
const COST_TOP_N: u32 = 10;
/// Ranges at or under this span bucket the cost timeline by hour.
const HOURLY_RANGE_HOURS: i64 = 48;

#[derive(Debug, Default, Deserialize)]
pub struct ScopeParams {
    pub agent_type: Option<String>,
    pub since: Option<String>,
}

impl ScopeParams {
    fn scope(&self) -> StatsScope {
        StatsScope {
            agent_type: self.agent_type.clone(),
            since: self.since.clone(),
        }
    }
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<EventQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (events, total) = state.store.events(&filter)?;
    Ok(Json(json!({"events": events, "total": total})))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScopeParams>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.store.stats_snapshot(&params.scope())?;
    Ok(Json(snapshot))
}

pub async fn tool_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScopeParams>,
) -> Result<impl IntoResponse, ApiError> {
    let tools = state.store.tool_stats(&params.scope())?;
    Ok(Json(json!({"tools": tools})))
}

pub async fn cost_breakdown(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScopeParams>,
) -> Result<impl IntoResponse, ApiError> {
    let hourly = params
        .since
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|since| Utc::now() - since.to_utc() <= Duration::hours(HOURLY_RANGE_HOURS))
        .unwrap_or(false);

    let breakdown = state
        .store
        .cost_breakdown(&params.scope(), hourly, COST_TOP_N)?;
    Ok(Json(breakdown))
}

pub async fn usage_monitor(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let reports = usage_reports(&state.store, &state.config.usage_limits, Utc::now())
        .map_err(ApiError::from)?;
    Ok(Json(reports))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SessionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (sessions, total) = state.store.sessions(&filter)?;
    Ok(Json(json!({"sessions": sessions, "total": total})))
}

pub async fn session_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .store
        .session(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
    let events = state
        .store
        .session_events_recent(&id, SESSION_DETAIL_EVENTS)?;
    Ok(Json(json!({"session": session, "events": events})))
}

pub async fn session_transcript(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.session(&id)?.is_none() {
        return Err(ApiError::NotFound(format!("session {id}")));
    }
    let events = state.store.session_events(&id)?;
    let entries = transcript::project(&events);
    Ok(Json(json!({"session_id": id, "entries": entries})))
}

pub async fn filter_options(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let options = state.store.filter_options()?;
    Ok(Json(options))
}
