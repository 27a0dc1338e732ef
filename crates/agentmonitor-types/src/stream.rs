use serde::{Deserialize, Serialize};

use crate::event::EventRecord;
use crate::stats::StatsSnapshot;

/// One message on the live stream. Serialized as a single SSE data
/// frame: `data: {"type": ..., ...}\n\n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Connected {
        client_id: String,
    },
    Event {
        #[serde(flatten)]
        event: EventRecord,
    },
    Stats {
        #[serde(flatten)]
        stats: StatsSnapshot,
    },
    SessionUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<crate::session::SessionStatus>,
        idled: u64,
        ended: u64,
    },
}

/// Per-client stream filter. A set field must compare equal on the
/// payload; a payload without that field does not match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientFilter {
    pub agent_type: Option<String>,
    pub event_type: Option<String>,
}

impl ClientFilter {
    pub fn is_empty(&self) -> bool {
        self.agent_type.is_none() && self.event_type.is_none()
    }

    pub fn matches(&self, message: &StreamMessage) -> bool {
        if self.is_empty() {
            return true;
        }
        match message {
            StreamMessage::Event { event } => {
                if let Some(agent_type) = &self.agent_type
                    && agent_type != &event.agent_type
                {
                    return false;
                }
                if let Some(event_type) = &self.event_type
                    && event_type != event.event_type.as_str()
                {
                    return false;
                }
                true
            }
            // Stats and session updates carry neither filterable field.
            _ => false,
        }
    }
}
