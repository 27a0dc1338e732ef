//! Usage monitor: rolling-window consumption against per-kind limits.

use std::collections::BTreeMap;

use agentmonitor_store::Store;
use agentmonitor_types::{LimitType, UsageReport, UsageWindow};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::time::to_canonical;

/// Configured ceilings for one agent kind: a short session window and a
/// longer extended window, both rolling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLimit {
    pub limit_type: LimitType,
    pub window_hours: u32,
    pub limit: f64,
    pub extended_window_hours: u32,
    pub extended_limit: f64,
}

/// Built-in limit table. Token-billed kinds track tokens over the
/// subscription's 5-hour block and rolling week; gemini bills by spend.
pub fn default_limits() -> BTreeMap<String, UsageLimit> {
    let mut limits = BTreeMap::new();
    limits.insert(
        "claude_code".to_string(),
        UsageLimit {
            limit_type: LimitType::Tokens,
            window_hours: 5,
            limit: 300_000.0,
            extended_window_hours: 168,
            extended_limit: 5_000_000.0,
        },
    );
    limits.insert(
        "codex".to_string(),
        UsageLimit {
            limit_type: LimitType::Tokens,
            window_hours: 5,
            limit: 250_000.0,
            extended_window_hours: 168,
            extended_limit: 4_000_000.0,
        },
    );
    limits.insert(
        "gemini".to_string(),
        UsageLimit {
            limit_type: LimitType::Cost,
            window_hours: 24,
            limit: 25.0,
            extended_window_hours: 168,
            extended_limit: 100.0,
        },
    );
    limits
}

/// Compute both windows for every configured kind. Kinds with no events
/// report zero usage rather than disappearing.
pub fn usage_reports(
    store: &Store,
    limits: &BTreeMap<String, UsageLimit>,
    now: DateTime<Utc>,
) -> Result<Vec<UsageReport>> {
    let mut reports = Vec::with_capacity(limits.len());
    for (agent_type, limit) in limits {
        let session = window_usage(store, agent_type, limit.limit_type, limit.window_hours, limit.limit, now)?;
        let extended = window_usage(
            store,
            agent_type,
            limit.limit_type,
            limit.extended_window_hours,
            limit.extended_limit,
            now,
        )?;
        reports.push(UsageReport {
            agent_type: agent_type.clone(),
            session,
            extended,
        });
    }
    Ok(reports)
}

fn window_usage(
    store: &Store,
    agent_type: &str,
    limit_type: LimitType,
    window_hours: u32,
    limit: f64,
    now: DateTime<Utc>,
) -> Result<UsageWindow> {
    let window_start = to_canonical(now - Duration::hours(window_hours as i64));
    let (tokens, cost) = store.usage_totals(agent_type, &window_start)?;
    let used = match limit_type {
        LimitType::Tokens => tokens as f64,
        LimitType::Cost => cost,
    };
    Ok(UsageWindow {
        used,
        limit,
        window_hours,
        limit_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmonitor_store::queries;
    use agentmonitor_types::{
        EventStatus, EventType, NormalizedEvent, SessionRecord, SessionStatus,
    };
    use chrono::TimeZone;

    fn seed(store: &Store, agent_type: &str, created_at: &str, tokens: u64, cost: f64) {
        store
            .write_tx(|tx| {
                queries::agents::upsert(tx, agent_type, agent_type, created_at)?;
                queries::sessions::upsert(
                    tx,
                    &SessionRecord {
                        id: format!("s-{agent_type}"),
                        agent_id: agent_type.to_string(),
                        agent_type: agent_type.to_string(),
                        project: None,
                        branch: None,
                        status: SessionStatus::Active,
                        started_at: created_at.to_string(),
                        ended_at: None,
                        last_event_at: created_at.to_string(),
                        metadata: serde_json::Value::Null,
                    },
                )?;
                queries::events::insert(
                    tx,
                    &NormalizedEvent {
                        event_id: None,
                        session_id: format!("s-{agent_type}"),
                        agent_type: agent_type.to_string(),
                        event_type: EventType::LlmResponse,
                        tool_name: None,
                        status: EventStatus::Success,
                        tokens_in: tokens,
                        tokens_out: 0,
                        cache_read_tokens: 0,
                        cache_write_tokens: 0,
                        duration_ms: None,
                        model: None,
                        cost_usd: Some(cost),
                        project: None,
                        branch: None,
                        source: None,
                        client_timestamp: None,
                        metadata: serde_json::Value::Null,
                        payload_truncated: false,
                    },
                    created_at,
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn windows_partition_by_recency() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();

        // Inside the 5h session window
        seed(&store, "claude_code", "2026-01-05T10:00:00.000Z", 1_000, 0.5);
        // Outside 5h but inside the week
        seed(&store, "claude_code", "2026-01-03T10:00:00.000Z", 9_000, 4.5);

        let reports = usage_reports(&store, &default_limits(), now).unwrap();
        let claude = reports.iter().find(|r| r.agent_type == "claude_code").unwrap();

        assert_eq!(claude.session.used, 1_000.0);
        assert_eq!(claude.extended.used, 10_000.0);
        assert_eq!(claude.session.window_hours, 5);
        assert_eq!(claude.extended.window_hours, 168);
        assert_eq!(claude.session.limit_type, LimitType::Tokens);
    }

    #[test]
    fn cost_limited_kind_sums_dollars() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        seed(&store, "gemini", "2026-01-05T11:00:00.000Z", 50_000, 1.25);

        let reports = usage_reports(&store, &default_limits(), now).unwrap();
        let gemini = reports.iter().find(|r| r.agent_type == "gemini").unwrap();
        assert_eq!(gemini.session.limit_type, LimitType::Cost);
        assert!((gemini.session.used - 1.25).abs() < 1e-9);
    }

    #[test]
    fn configured_kinds_report_even_when_silent() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let reports = usage_reports(&store, &default_limits(), now).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.session.used == 0.0));
    }
}
