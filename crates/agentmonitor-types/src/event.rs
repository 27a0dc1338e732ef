use serde::{Deserialize, Serialize};
use serde_json::Value;

// NOTE: Schema Design
//
// The event row is the single source of truth for everything downstream:
// stats, cost breakdowns, transcripts, and the live stream all project
// from it. Rows are append-only; the only permitted rewrite is the batch
// cost recalculation, which touches cost_usd and nothing else.

/// Classification of one observation. Closed set; extending it is a
/// contract version bump, not a runtime affair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    SessionEnd,
    ToolUse,
    UserPrompt,
    LlmRequest,
    LlmResponse,
    Response,
    Error,
    PlanStep,
    FileChange,
    GitCommit,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        EventType::SessionStart,
        EventType::SessionEnd,
        EventType::ToolUse,
        EventType::UserPrompt,
        EventType::LlmRequest,
        EventType::LlmResponse,
        EventType::Response,
        EventType::Error,
        EventType::PlanStep,
        EventType::FileChange,
        EventType::GitCommit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStart => "session_start",
            EventType::SessionEnd => "session_end",
            EventType::ToolUse => "tool_use",
            EventType::UserPrompt => "user_prompt",
            EventType::LlmRequest => "llm_request",
            EventType::LlmResponse => "llm_response",
            EventType::Response => "response",
            EventType::Error => "error",
            EventType::PlanStep => "plan_step",
            EventType::FileChange => "file_change",
            EventType::GitCommit => "git_commit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

/// Outcome of the observed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Error,
    Timeout,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "success",
            EventStatus::Error => "error",
            EventStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(EventStatus::Success),
            "error" => Some(EventStatus::Error),
            "timeout" => Some(EventStatus::Timeout),
            _ => None,
        }
    }
}

/// Origin of an event: direct HTTP, hook script, OTLP exporter, or
/// historical import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Api,
    Hook,
    Otel,
    Import,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Api => "api",
            SourceTag::Hook => "hook",
            SourceTag::Otel => "otel",
            SourceTag::Import => "import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "api" => Some(SourceTag::Api),
            "hook" => Some(SourceTag::Hook),
            "otel" => Some(SourceTag::Otel),
            "import" => Some(SourceTag::Import),
            _ => None,
        }
    }
}

/// A contract-clean event ready for persistence. Produced by the
/// normalization pipeline; carries no server-assigned fields yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event_id: Option<String>,
    pub session_id: String,
    pub agent_type: String,
    pub event_type: EventType,
    pub tool_name: Option<String>,
    pub status: EventStatus,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub duration_ms: Option<u64>,
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
    pub project: Option<String>,
    pub branch: Option<String>,
    pub source: Option<SourceTag>,
    /// RFC 3339 UTC, already re-rendered from the client's offset.
    pub client_timestamp: Option<String>,
    pub metadata: Value,
    pub payload_truncated: bool,
}

/// One persisted event. Maps 1:1 to an `events` table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Server-assigned monotonic id.
    pub id: i64,
    /// Externally-supplied correlation id; globally unique when present.
    pub event_id: Option<String>,
    pub session_id: String,
    pub agent_type: String,
    pub event_type: EventType,
    pub tool_name: Option<String>,
    pub status: EventStatus,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub duration_ms: Option<u64>,
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
    pub project: Option<String>,
    pub branch: Option<String>,
    pub source: Option<SourceTag>,
    pub client_timestamp: Option<String>,
    /// Wall clock at persistence, RFC 3339 UTC.
    pub created_at: String,
    pub metadata: Value,
    pub payload_truncated: bool,
}

/// One field-level contract violation. Rejections carry a list of these
/// and never partially apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Filter set accepted by the event query surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub agent_type: Option<String>,
    pub event_type: Option<String>,
    pub tool_name: Option<String>,
    pub session_id: Option<String>,
    pub branch: Option<String>,
    pub model: Option<String>,
    pub source: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    /// Default 50; 0 means unbounded.
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
