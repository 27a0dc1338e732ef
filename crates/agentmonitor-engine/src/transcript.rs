//! Transcript reconstruction: project a session's events, in
//! chronological order, into typed conversation entries.

use agentmonitor_types::{EventRecord, EventStatus, EventType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    System,
    User,
    Assistant,
    Tool,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptPayload {
    Lifecycle {
        event_type: EventType,
    },
    Prompt {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        tokens_in: u64,
        tokens_out: u64,
    },
    ToolCall {
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        status: EventStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    Failure {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub timestamp: String,
    #[serde(flatten)]
    pub payload: TranscriptPayload,
}

/// Project events (assumed chronological) into transcript entries.
/// Finite and non-restartable: one pass, one entry per event.
pub fn project(events: &[EventRecord]) -> Vec<TranscriptEntry> {
    events.iter().map(entry_for).collect()
}

fn entry_for(event: &EventRecord) -> TranscriptEntry {
    let timestamp = event
        .client_timestamp
        .clone()
        .unwrap_or_else(|| event.created_at.clone());

    let (role, payload) = match event.event_type {
        EventType::UserPrompt => (
            TranscriptRole::User,
            TranscriptPayload::Prompt {
                text: text_from_metadata(&event.metadata, &["prompt", "text", "message"]),
            },
        ),
        EventType::LlmResponse | EventType::Response => (
            TranscriptRole::Assistant,
            TranscriptPayload::Assistant {
                text: text_from_metadata(&event.metadata, &["text", "response", "message"]),
                model: event.model.clone(),
                tokens_in: event.tokens_in,
                tokens_out: event.tokens_out,
            },
        ),
        EventType::ToolUse => (
            TranscriptRole::Tool,
            TranscriptPayload::ToolCall {
                tool_name: event.tool_name.clone(),
                status: event.status,
                duration_ms: event.duration_ms,
            },
        ),
        EventType::Error => (
            TranscriptRole::Error,
            TranscriptPayload::Failure {
                message: text_from_metadata(&event.metadata, &["error", "message"]),
            },
        ),
        // Lifecycle and bookkeeping events narrate as system entries
        other => (
            TranscriptRole::System,
            TranscriptPayload::Lifecycle { event_type: other },
        ),
    };

    TranscriptEntry {
        role,
        timestamp,
        payload,
    }
}

fn text_from_metadata(metadata: &Value, keys: &[&str]) -> Option<String> {
    let object = metadata.as_object()?;
    for key in keys {
        if let Some(text) = object.get(*key).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }
    None
}
