//! Session lifecycle state machine.
//!
//! Transitions are computed as a pure function over the current row and
//! the incoming event, then applied by the ingest transaction. The idle
//! sweeper's time-based demotions live in the store; this module owns
//! the event-driven edges.

use agentmonitor_types::{EventType, NormalizedEvent, SessionRecord, SessionStatus, SourceTag};
use chrono::{DateTime, Duration, Utc};

use crate::time::to_canonical;

/// Events imported with a client timestamp older than this are treated
/// as historical backfill: their sessions are finalized at insert time
/// and never surface in the live agent list.
pub const HISTORICAL_IMPORT_THRESHOLD_HOURS: i64 = 1;

/// Result of driving one event through the state machine.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub record: SessionRecord,
    /// True when the stored status changes, which triggers a
    /// session_update broadcast.
    pub status_changed: bool,
}

/// Whether an event counts as historical backfill rather than live
/// traffic.
pub fn is_historical(event: &NormalizedEvent, now: DateTime<Utc>) -> bool {
    if event.source != Some(SourceTag::Import) {
        return false;
    }
    let Some(raw) = &event.client_timestamp else {
        return false;
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.to_utc() < now - Duration::hours(HISTORICAL_IMPORT_THRESHOLD_HOURS),
        Err(_) => false,
    }
}

/// Drive one accepted (non-duplicate) event through the state machine.
pub fn apply_event(
    existing: Option<&SessionRecord>,
    event: &NormalizedEvent,
    now: DateTime<Utc>,
) -> SessionPlan {
    let now_str = to_canonical(now);
    let historical = is_historical(event, now);
    let event_time = if historical {
        event.client_timestamp.clone().unwrap_or_else(|| now_str.clone())
    } else {
        now_str.clone()
    };

    match existing {
        None => {
            let (status, ended_at) = if historical {
                (SessionStatus::Ended, Some(event_time.clone()))
            } else {
                (SessionStatus::Active, None)
            };
            let record = SessionRecord {
                id: event.session_id.clone(),
                agent_id: event.agent_type.clone(),
                agent_type: event.agent_type.clone(),
                project: event.project.clone(),
                branch: event.branch.clone(),
                status,
                started_at: event_time.clone(),
                ended_at,
                last_event_at: event_time,
                metadata: serde_json::Value::Null,
            };
            SessionPlan {
                status_changed: true,
                record,
            }
        }
        Some(current) => {
            let mut record = current.clone();
            if event.project.is_some() {
                record.project = event.project.clone();
            }
            if event.branch.is_some() {
                record.branch = event.branch.clone();
            }

            if historical {
                // Backfill into an already-ended session changes nothing;
                // into a live one it only widens the event range.
                if event_time > record.last_event_at {
                    record.last_event_at = event_time;
                }
                return SessionPlan {
                    status_changed: false,
                    record,
                };
            }

            record.last_event_at = now_str.clone();

            let next = if event.event_type == EventType::SessionEnd {
                // Live end keeps the card visible: idle, not ended.
                SessionStatus::Idle
            } else {
                SessionStatus::Active
            };

            let status_changed = next != record.status;
            if status_changed && record.status == SessionStatus::Ended {
                // Resurrection reopens the lifecycle
                record.ended_at = None;
            }
            record.status = next;

            SessionPlan {
                status_changed,
                record,
            }
        }
    }
}
