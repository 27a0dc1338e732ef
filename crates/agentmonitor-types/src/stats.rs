use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregate counters over the event store. Every field has a stable
/// zero shape when nothing matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_events: u64,
    pub active_sessions: u64,
    pub total_sessions: u64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    pub total_cost_usd: f64,
    pub tool_breakdown: BTreeMap<String, u64>,
    pub agent_breakdown: BTreeMap<String, u64>,
    pub model_breakdown: BTreeMap<String, u64>,
    /// Distinct branches, most recently seen first.
    pub branches: Vec<String>,
}

/// Per-tool analytics row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStat {
    pub tool_name: String,
    pub total_calls: u64,
    pub error_count: u64,
    pub error_rate: f64,
    /// Null when no call carried a duration.
    pub avg_duration_ms: Option<f64>,
    pub by_agent: BTreeMap<String, u64>,
}

/// One point on the cost timeline. Buckets are hour keys
/// (`YYYY-MM-DDTHH:00`) for short ranges and day keys (`YYYY-MM-DD`)
/// for long ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBucket {
    pub bucket: String,
    pub cost_usd: f64,
    pub events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCost {
    pub project: String,
    pub cost_usd: f64,
    pub events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCost {
    pub model: String,
    pub cost_usd: f64,
    pub events: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub timeline: Vec<CostBucket>,
    pub by_project: Vec<ProjectCost>,
    pub by_model: Vec<ModelCost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchOption {
    pub value: String,
    pub last_seen: String,
}

/// Distinct values across the filterable dimensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterOptions {
    pub agent_types: Vec<String>,
    pub event_types: Vec<String>,
    pub tool_names: Vec<String>,
    pub models: Vec<String>,
    pub projects: Vec<String>,
    pub branches: Vec<BranchOption>,
    pub sources: Vec<String>,
}

/// Whether a usage limit counts tokens or dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    Tokens,
    Cost,
}

/// One rolling-window rollup against a configured limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageWindow {
    pub used: f64,
    pub limit: f64,
    pub window_hours: u32,
    pub limit_type: LimitType,
}

/// Usage-monitor entry for one configured agent kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub agent_type: String,
    pub session: UsageWindow,
    pub extended: UsageWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_window_uses_camel_case_keys() {
        let window = UsageWindow {
            used: 1200.0,
            limit: 300_000.0,
            window_hours: 5,
            limit_type: LimitType::Tokens,
        };
        let json = serde_json::to_value(&window).unwrap();
        assert_eq!(json["windowHours"], 5);
        assert_eq!(json["limitType"], "tokens");
    }

    #[test]
    fn empty_snapshot_has_stable_shape() {
        let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
        assert_eq!(json["total_events"], 0);
        assert!(json["tool_breakdown"].as_object().unwrap().is_empty());
        assert!(json["branches"].as_array().unwrap().is_empty());
    }
}
