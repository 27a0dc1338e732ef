use agentmonitor_types::{SessionQuery, SessionRecord, SessionStatus};
use rusqlite::{Connection, Row, params};

use crate::{Error, Result};

const SESSION_COLUMNS: &str =
    "id, agent_id, agent_type, project, branch, status, started_at, ended_at, last_event_at, metadata";

pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>> {
    let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
    let mut stmt = conn.prepare(&query)?;
    let mut rows = stmt.query([session_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(map_session(row)?)),
        None => Ok(None),
    }
}

pub fn upsert(conn: &Connection, session: &SessionRecord) -> Result<()> {
    let metadata = match &session.metadata {
        serde_json::Value::Null => None,
        value => Some(serde_json::to_string(value).map_err(|e| Error::Query(e.to_string()))?),
    };

    conn.execute(
        r#"
        INSERT INTO sessions (id, agent_id, agent_type, project, branch, status,
                              started_at, ended_at, last_event_at, metadata)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            agent_id = ?2,
            agent_type = ?3,
            project = COALESCE(?4, project),
            branch = COALESCE(?5, branch),
            status = ?6,
            started_at = ?7,
            ended_at = ?8,
            last_event_at = ?9,
            metadata = COALESCE(?10, metadata)
        "#,
        params![
            &session.id,
            &session.agent_id,
            &session.agent_type,
            &session.project,
            &session.branch,
            session.status.as_str(),
            &session.started_at,
            &session.ended_at,
            &session.last_event_at,
            metadata,
        ],
    )?;

    Ok(())
}

/// Filterable session listing, most recent activity first.
pub fn list(conn: &Connection, filter: &SessionQuery) -> Result<(Vec<SessionRecord>, u64)> {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(status) = &filter.status {
        where_clauses.push("status = ?");
        params.push(Box::new(status.clone()));
    }
    if let Some(exclude) = &filter.exclude_status {
        where_clauses.push("status != ?");
        params.push(Box::new(exclude.clone()));
    }
    if let Some(agent_type) = &filter.agent_type {
        where_clauses.push("agent_type = ?");
        params.push(Box::new(agent_type.clone()));
    }

    let where_clause = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let count_query = format!("SELECT COUNT(*) FROM sessions {where_clause}");
    let total: i64 = conn.query_row(&count_query, param_refs.as_slice(), |row| row.get(0))?;

    let limit = filter.limit.unwrap_or(0);
    let limit_sql = if limit == 0 { -1 } else { limit as i64 };

    let query = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions {where_clause} \
         ORDER BY last_event_at DESC LIMIT {limit_sql}"
    );

    let mut stmt = conn.prepare(&query)?;
    let sessions = stmt
        .query_map(param_refs.as_slice(), |row| Ok(map_session(row)))?
        .collect::<std::result::Result<std::result::Result<Vec<_>, _>, _>>()??;

    Ok((sessions, total as u64))
}

/// Demote active sessions whose last activity predates the idle cutoff.
/// Does not touch ended_at.
pub fn sweep_idle(conn: &Connection, idle_cutoff: &str) -> Result<u64> {
    let changed = conn.execute(
        "UPDATE sessions SET status = 'idle' WHERE status = 'active' AND last_event_at < ?1",
        [idle_cutoff],
    )?;
    Ok(changed as u64)
}

/// Finalize idle sessions whose last activity predates the end cutoff.
/// Sets ended_at to `now`, which is >= last_event_at by construction.
pub fn sweep_ended(conn: &Connection, end_cutoff: &str, now: &str) -> Result<u64> {
    let changed = conn.execute(
        "UPDATE sessions SET status = 'ended', ended_at = ?2
         WHERE status = 'idle' AND last_event_at < ?1",
        params![end_cutoff, now],
    )?;
    Ok(changed as u64)
}

fn map_session(row: &Row<'_>) -> Result<SessionRecord> {
    let status_raw: String = row.get(5)?;
    let status = SessionStatus::parse(&status_raw)
        .ok_or_else(|| Error::Query(format!("unknown session status in store: {status_raw}")))?;

    let metadata: Option<String> = row.get(9)?;
    let metadata = match metadata {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| Error::Query(e.to_string()))?,
        None => serde_json::Value::Null,
    };

    Ok(SessionRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        agent_type: row.get(2)?,
        project: row.get(3)?,
        branch: row.get(4)?,
        status,
        started_at: row.get(6)?,
        ended_at: row.get(7)?,
        last_event_at: row.get(8)?,
        metadata,
    })
}
