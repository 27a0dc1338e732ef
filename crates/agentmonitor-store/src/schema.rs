use rusqlite::Connection;

use crate::Result;

// NOTE: Migration policy
//
// Migrations are idempotent and strictly additive: missing tables and
// indexes are created, missing columns are added with non-destructive
// defaults. Existing columns are never dropped or rewritten, so a
// database written by any earlier release keeps working.

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            agent_type TEXT NOT NULL,
            display_name TEXT,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            agent_type TEXT NOT NULL,
            project TEXT,
            branch TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            started_at TEXT NOT NULL,
            ended_at TEXT,
            last_event_at TEXT NOT NULL,
            metadata TEXT,
            FOREIGN KEY (agent_id) REFERENCES agents(id)
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE,
            session_id TEXT NOT NULL,
            agent_type TEXT NOT NULL,
            event_type TEXT NOT NULL,
            tool_name TEXT,
            status TEXT NOT NULL DEFAULT 'success',
            tokens_in INTEGER NOT NULL DEFAULT 0,
            tokens_out INTEGER NOT NULL DEFAULT 0,
            cache_read_tokens INTEGER NOT NULL DEFAULT 0,
            cache_write_tokens INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER,
            model TEXT,
            cost_usd REAL,
            project TEXT,
            branch TEXT,
            source TEXT,
            client_timestamp TEXT,
            created_at TEXT NOT NULL,
            metadata TEXT,
            payload_truncated INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );

        CREATE TABLE IF NOT EXISTS import_state (
            source TEXT NOT NULL,
            file_path TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            imported_at TEXT NOT NULL,
            record_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (source, file_path)
        );

        CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at);
        CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
        CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
        CREATE INDEX IF NOT EXISTS idx_events_tool ON events(tool_name);
        CREATE INDEX IF NOT EXISTS idx_events_agent ON events(agent_type);
        CREATE INDEX IF NOT EXISTS idx_events_model ON events(model);
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
        CREATE INDEX IF NOT EXISTS idx_sessions_last_event ON sessions(last_event_at);
        "#,
    )?;

    apply_column_migrations(conn)?;

    Ok(())
}

/// Columns added after the base schema shipped. Each entry is applied
/// only when the column is absent.
fn apply_column_migrations(conn: &Connection) -> Result<()> {
    ensure_column(conn, "events", "cache_read_tokens", "INTEGER NOT NULL DEFAULT 0")?;
    ensure_column(conn, "events", "cache_write_tokens", "INTEGER NOT NULL DEFAULT 0")?;
    ensure_column(conn, "events", "source", "TEXT")?;
    ensure_column(conn, "events", "payload_truncated", "INTEGER NOT NULL DEFAULT 0")?;
    ensure_column(conn, "sessions", "branch", "TEXT")?;
    ensure_column(conn, "sessions", "metadata", "TEXT")?;
    ensure_column(conn, "agents", "display_name", "TEXT")?;
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, ddl: &str) -> Result<()> {
    if !column_exists(conn, table, column)? {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {ddl};"))?;
    }
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
