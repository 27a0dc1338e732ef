use serde::{Deserialize, Serialize};

/// Stable identity for a producer of events. Created on first sight,
/// touched on every subsequent ingest, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    /// Agent kind tag, e.g. `claude_code`, `codex`.
    pub agent_type: String,
    pub display_name: Option<String>,
    pub first_seen: String,
    pub last_seen: String,
}
