use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a session. Transitions are driven by the ingest
/// path and the idle sweeper; `ended` is terminal for the logical
/// instance but a live event may resurrect the same identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Idle,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Idle => "idle",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "idle" => Some(SessionStatus::Idle),
            "ended" => Some(SessionStatus::Ended),
            _ => None,
        }
    }
}

/// One bounded stream of activity from one agent.
///
/// Invariants: `last_event_at >= started_at`; when `ended_at` is set it
/// is >= `last_event_at` at the moment of ending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Externally supplied identifier.
    pub id: String,
    pub agent_id: String,
    pub agent_type: String,
    pub project: Option<String>,
    pub branch: Option<String>,
    pub status: SessionStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub last_event_at: String,
    pub metadata: Value,
}

/// Filter set accepted by the session listing surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionQuery {
    pub status: Option<String>,
    pub exclude_status: Option<String>,
    pub agent_type: Option<String>,
    /// 0 means unbounded.
    pub limit: Option<u32>,
}

/// Bookkeeping row for idempotent historical backfill, keyed by
/// (source, absolute file path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStateRecord {
    pub source: String,
    pub file_path: String,
    pub content_hash: String,
    pub imported_at: String,
    pub record_count: u64,
}
