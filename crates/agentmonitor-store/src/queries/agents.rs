use agentmonitor_types::AgentRecord;
use rusqlite::{Connection, params};

use crate::Result;

/// Create the agent on first sight, refresh last_seen afterwards.
/// Agents are never deleted.
pub fn upsert(conn: &Connection, id: &str, agent_type: &str, now: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO agents (id, agent_type, display_name, first_seen, last_seen)
        VALUES (?1, ?2, NULL, ?3, ?3)
        ON CONFLICT(id) DO UPDATE SET
            agent_type = ?2,
            last_seen = ?3
        "#,
        params![id, agent_type, now],
    )?;
    Ok(())
}

pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<AgentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, agent_type, display_name, first_seen, last_seen FROM agents WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => Ok(Some(AgentRecord {
            id: row.get(0)?,
            agent_type: row.get(1)?,
            display_name: row.get(2)?,
            first_seen: row.get(3)?,
            last_seen: row.get(4)?,
        })),
        None => Ok(None),
    }
}
