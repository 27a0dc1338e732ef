//! Integration tests for the query surface: event filters, duplicate
//! swallowing, aggregation shapes, and the idle sweep.

use agentmonitor_store::{queries, Store, StatsScope};
use agentmonitor_types::{
    EventQuery, EventStatus, EventType, NormalizedEvent, SessionQuery, SessionRecord,
    SessionStatus, SourceTag,
};

fn event(session_id: &str, event_type: EventType) -> NormalizedEvent {
    NormalizedEvent {
        event_id: None,
        session_id: session_id.to_string(),
        agent_type: "claude_code".to_string(),
        event_type,
        tool_name: None,
        status: EventStatus::Success,
        tokens_in: 100,
        tokens_out: 50,
        cache_read_tokens: 0,
        cache_write_tokens: 0,
        duration_ms: None,
        model: None,
        cost_usd: Some(0.01),
        project: Some("demo".to_string()),
        branch: Some("main".to_string()),
        source: Some(SourceTag::Api),
        client_timestamp: None,
        metadata: serde_json::Value::Null,
        payload_truncated: false,
    }
}

fn seed_session(store: &Store, session_id: &str, last_event_at: &str, status: SessionStatus) {
    store
        .write_tx(|tx| {
            queries::agents::upsert(tx, "claude_code", "claude_code", last_event_at)?;
            queries::sessions::upsert(
                tx,
                &SessionRecord {
                    id: session_id.to_string(),
                    agent_id: "claude_code".to_string(),
                    agent_type: "claude_code".to_string(),
                    project: Some("demo".to_string()),
                    branch: Some("main".to_string()),
                    status,
                    started_at: last_event_at.to_string(),
                    ended_at: None,
                    last_event_at: last_event_at.to_string(),
                    metadata: serde_json::Value::Null,
                },
            )
        })
        .unwrap();
}

fn insert_event(store: &Store, event: &NormalizedEvent, created_at: &str) -> Option<i64> {
    store
        .write_tx(|tx| queries::events::insert(tx, event, created_at))
        .unwrap()
}

#[test]
fn duplicate_event_id_is_swallowed_not_errored() {
    let store = Store::open_in_memory().unwrap();
    seed_session(&store, "s-1", "2026-01-05T10:00:00.000Z", SessionStatus::Active);

    let mut first = event("s-1", EventType::ToolUse);
    first.event_id = Some("evt-1".to_string());

    let id = insert_event(&store, &first, "2026-01-05T10:00:01.000Z");
    assert!(id.is_some());

    let second = insert_event(&store, &first, "2026-01-05T10:00:02.000Z");
    assert_eq!(second, None);

    let (events, total) = store
        .events(&EventQuery {
            session_id: Some("s-1".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id.as_deref(), Some("evt-1"));
}

#[test]
fn event_filters_compose() {
    let store = Store::open_in_memory().unwrap();
    seed_session(&store, "s-1", "2026-01-05T10:00:00.000Z", SessionStatus::Active);
    seed_session(&store, "s-2", "2026-01-05T10:00:00.000Z", SessionStatus::Active);

    insert_event(&store, &event("s-1", EventType::ToolUse), "2026-01-05T10:00:01.000Z");
    insert_event(&store, &event("s-1", EventType::UserPrompt), "2026-01-05T10:00:02.000Z");
    insert_event(&store, &event("s-2", EventType::ToolUse), "2026-01-05T10:00:03.000Z");

    let (events, total) = store
        .events(&EventQuery {
            event_type: Some("tool_use".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(total, 2);
    // Newest first
    assert_eq!(events[0].session_id, "s-2");

    let (_, total_since) = store
        .events(&EventQuery {
            since: Some("2026-01-05T10:00:02.000Z".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(total_since, 2);

    let (page, total_all) = store
        .events(&EventQuery {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(total_all, 3);
    assert_eq!(page.len(), 1);
}

#[test]
fn zero_limit_means_unbounded() {
    let store = Store::open_in_memory().unwrap();
    seed_session(&store, "s-1", "2026-01-05T10:00:00.000Z", SessionStatus::Active);
    for i in 0..60 {
        insert_event(
            &store,
            &event("s-1", EventType::ToolUse),
            &format!("2026-01-05T10:00:{:02}.000Z", i),
        );
    }

    let (default_page, _) = store.events(&EventQuery::default()).unwrap();
    assert_eq!(default_page.len(), 50);

    let (all, _) = store
        .events(&EventQuery {
            limit: Some(0),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all.len(), 60);
}

#[test]
fn stats_snapshot_counts_and_breakdowns() {
    let store = Store::open_in_memory().unwrap();
    seed_session(&store, "s-1", "2026-01-05T10:00:00.000Z", SessionStatus::Active);

    let mut tool_event = event("s-1", EventType::ToolUse);
    tool_event.tool_name = Some("Bash".to_string());
    tool_event.model = Some("claude-sonnet-4-5".to_string());
    insert_event(&store, &tool_event, "2026-01-05T10:00:01.000Z");
    insert_event(&store, &event("s-1", EventType::UserPrompt), "2026-01-05T10:00:02.000Z");

    let stats = store.stats_snapshot(&StatsScope::default()).unwrap();
    assert_eq!(stats.total_events, 2);
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_tokens_in, 200);
    assert_eq!(stats.total_tokens_out, 100);
    assert!((stats.total_cost_usd - 0.02).abs() < 1e-9);
    assert_eq!(stats.tool_breakdown.get("Bash"), Some(&1));
    assert_eq!(stats.agent_breakdown.get("claude_code"), Some(&2));
    assert_eq!(stats.model_breakdown.get("claude-sonnet-4-5"), Some(&1));
    assert_eq!(stats.branches, vec!["main".to_string()]);
}

#[test]
fn tool_stats_error_rate_and_durations() {
    let store = Store::open_in_memory().unwrap();
    seed_session(&store, "s-1", "2026-01-05T10:00:00.000Z", SessionStatus::Active);

    let mut ok = event("s-1", EventType::ToolUse);
    ok.tool_name = Some("Bash".to_string());
    ok.duration_ms = Some(100);
    insert_event(&store, &ok, "2026-01-05T10:00:01.000Z");

    let mut failed = event("s-1", EventType::ToolUse);
    failed.tool_name = Some("Bash".to_string());
    failed.status = EventStatus::Error;
    failed.duration_ms = Some(300);
    insert_event(&store, &failed, "2026-01-05T10:00:02.000Z");

    let mut quiet = event("s-1", EventType::ToolUse);
    quiet.tool_name = Some("Read".to_string());
    insert_event(&store, &quiet, "2026-01-05T10:00:03.000Z");

    let tools = store.tool_stats(&StatsScope::default()).unwrap();
    let bash = tools.iter().find(|t| t.tool_name == "Bash").unwrap();
    assert_eq!(bash.total_calls, 2);
    assert_eq!(bash.error_count, 1);
    assert!((bash.error_rate - 0.5).abs() < 1e-9);
    assert_eq!(bash.avg_duration_ms, Some(200.0));
    assert_eq!(bash.by_agent.get("claude_code"), Some(&2));

    let read = tools.iter().find(|t| t.tool_name == "Read").unwrap();
    assert_eq!(read.avg_duration_ms, None);
}

#[test]
fn sweep_transitions_active_to_idle_to_ended() {
    let store = Store::open_in_memory().unwrap();
    seed_session(&store, "s-stale", "2026-01-05T09:00:00.000Z", SessionStatus::Active);
    seed_session(&store, "s-fresh", "2026-01-05T10:59:00.000Z", SessionStatus::Active);

    // First pass: stale session idles, fresh one stays active. The end
    // cutoff is still behind its last activity, so it is not finalized.
    let (idled, ended) = store
        .sweep_sessions(
            "2026-01-05T10:55:00.000Z",
            "2026-01-05T08:00:00.000Z",
            "2026-01-05T11:00:00.000Z",
        )
        .unwrap();
    assert_eq!(idled, 1);
    assert_eq!(ended, 0);
    assert_eq!(
        store.session("s-stale").unwrap().unwrap().status,
        SessionStatus::Idle
    );
    assert!(store.session("s-stale").unwrap().unwrap().ended_at.is_none());
    assert_eq!(
        store.session("s-fresh").unwrap().unwrap().status,
        SessionStatus::Active
    );

    // Second pass: the idle session crosses the end cutoff
    let (idled, ended) = store
        .sweep_sessions(
            "2026-01-05T10:55:00.000Z",
            "2026-01-05T10:50:00.000Z",
            "2026-01-05T11:05:00.000Z",
        )
        .unwrap();
    assert_eq!(idled, 0);
    assert_eq!(ended, 1);

    let stale = store.session("s-stale").unwrap().unwrap();
    assert_eq!(stale.status, SessionStatus::Ended);
    let ended_at = stale.ended_at.unwrap();
    assert!(ended_at.as_str() >= stale.last_event_at.as_str());
    assert!(ended_at.as_str() >= stale.started_at.as_str());
}

#[test]
fn session_list_filters() {
    let store = Store::open_in_memory().unwrap();
    seed_session(&store, "s-1", "2026-01-05T10:00:00.000Z", SessionStatus::Active);
    seed_session(&store, "s-2", "2026-01-05T10:01:00.000Z", SessionStatus::Ended);

    let (active, total) = store
        .sessions(&SessionQuery {
            status: Some("active".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(active[0].id, "s-1");

    let (not_ended, _) = store
        .sessions(&SessionQuery {
            exclude_status: Some("ended".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(not_ended.len(), 1);
    assert_eq!(not_ended[0].id, "s-1");
}

#[test]
fn metadata_round_trips_through_storage() {
    let store = Store::open_in_memory().unwrap();
    seed_session(&store, "s-1", "2026-01-05T10:00:00.000Z", SessionStatus::Active);

    let mut with_metadata = event("s-1", EventType::ToolUse);
    with_metadata.metadata = serde_json::json!({"command": "pnpm test", "exit_code": 0});
    with_metadata.payload_truncated = false;
    let id = insert_event(&store, &with_metadata, "2026-01-05T10:00:01.000Z").unwrap();

    let stored = store.event_by_id(id).unwrap().unwrap();
    assert_eq!(stored.metadata["command"], "pnpm test");
    assert_eq!(stored.metadata["exit_code"], 0);
}
