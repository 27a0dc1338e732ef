//! Integration tests for schema migration
//!
//! These tests verify that Store::open upgrades an older database by
//! adding missing columns in place, without dropping rows.

use rusqlite::Connection;
use std::path::Path;
use tempfile::TempDir;

use agentmonitor_store::Store;

/// Create a database with the first-release schema, which lacked cache
/// token columns, source tags, and the payload_truncated flag.
fn create_old_schema_db(path: &Path) {
    let conn = Connection::open(path).unwrap();

    conn.execute_batch(
        r#"
        CREATE TABLE agents (
            id TEXT PRIMARY KEY,
            agent_type TEXT NOT NULL,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL
        );

        CREATE TABLE sessions (
            id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            agent_type TEXT NOT NULL,
            project TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            started_at TEXT NOT NULL,
            ended_at TEXT,
            last_event_at TEXT NOT NULL,
            FOREIGN KEY (agent_id) REFERENCES agents(id)
        );

        CREATE TABLE events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE,
            session_id TEXT NOT NULL,
            agent_type TEXT NOT NULL,
            event_type TEXT NOT NULL,
            tool_name TEXT,
            status TEXT NOT NULL DEFAULT 'success',
            tokens_in INTEGER NOT NULL DEFAULT 0,
            tokens_out INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER,
            model TEXT,
            cost_usd REAL,
            project TEXT,
            branch TEXT,
            client_timestamp TEXT,
            created_at TEXT NOT NULL,
            metadata TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );
        "#,
    )
    .unwrap();

    conn.execute(
        "INSERT INTO agents VALUES ('claude_code', 'claude_code', '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO sessions (id, agent_id, agent_type, status, started_at, last_event_at)
         VALUES ('s-old', 'claude_code', 'claude_code', 'active', '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO events (event_id, session_id, agent_type, event_type, status, tokens_in, tokens_out, created_at)
         VALUES ('evt-old', 's-old', 'claude_code', 'tool_use', 'success', 10, 5, '2026-01-01T00:00:00.000Z')",
        [],
    )
    .unwrap();
}

#[test]
fn open_migrates_old_schema_in_place() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("agentmonitor.db");

    create_old_schema_db(&db_path);

    let store = Store::open(&db_path).expect("Store::open should migrate the old schema");

    // New columns exist and carry their defaults on pre-existing rows
    let event = store.event_by_id(1).unwrap().expect("old event survives");
    assert_eq!(event.event_id.as_deref(), Some("evt-old"));
    assert_eq!(event.cache_read_tokens, 0);
    assert_eq!(event.cache_write_tokens, 0);
    assert!(!event.payload_truncated);
    assert!(event.source.is_none());

    let session = store.session("s-old").unwrap().expect("old session survives");
    assert!(session.branch.is_none());
    assert!(session.metadata.is_null());
}

#[test]
fn migration_is_idempotent_across_reopens() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("agentmonitor.db");

    create_old_schema_db(&db_path);

    for _ in 0..3 {
        let store = Store::open(&db_path).unwrap();
        store.health_check().unwrap();
    }

    let store = Store::open(&db_path).unwrap();
    assert!(store.event_by_id(1).unwrap().is_some());
}
