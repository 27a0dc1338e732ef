use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use agentmonitor_types::ClientFilter;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::StreamExt;
use futures::stream::Stream;

use crate::error::ApiError;
use crate::state::AppState;

/// Open the live stream. The `connected` frame is always first; from
/// then on the client receives every matching `event`, `stats`, and
/// `session_update` frame in publish order, with `: heartbeat` comments
/// keeping the connection warm.
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ClientFilter>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state.hub.subscribe(filter).ok_or(ApiError::Saturated {
        max_clients: state.hub.max_clients(),
    })?;

    // The subscription deregisters itself when the response stream is
    // dropped, so a disconnect frees the slot immediately.
    let stream = subscription.map(|message| {
        let data = serde_json::to_string(&message).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_millis(state.config.sse_heartbeat_ms))
            .text("heartbeat"),
    ))
}
