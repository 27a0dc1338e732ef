use agentmonitor_types::{
    EventQuery, EventRecord, EventStatus, EventType, NormalizedEvent, SourceTag,
};
use rusqlite::{Connection, Row, params};

use crate::{Error, Result};

pub const DEFAULT_QUERY_LIMIT: u32 = 50;

const EVENT_COLUMNS: &str = "id, event_id, session_id, agent_type, event_type, tool_name, status, \
     tokens_in, tokens_out, cache_read_tokens, cache_write_tokens, duration_ms, model, cost_usd, \
     project, branch, source, client_timestamp, created_at, metadata, payload_truncated";

pub fn insert(conn: &Connection, event: &NormalizedEvent, created_at: &str) -> Result<Option<i64>> {
    let metadata = match &event.metadata {
        serde_json::Value::Null => None,
        value => Some(serde_json::to_string(value).map_err(|e| Error::Query(e.to_string()))?),
    };

    let changed = conn.execute(
        r#"
        INSERT OR IGNORE INTO events (
            event_id, session_id, agent_type, event_type, tool_name, status,
            tokens_in, tokens_out, cache_read_tokens, cache_write_tokens,
            duration_ms, model, cost_usd, project, branch, source,
            client_timestamp, created_at, metadata, payload_truncated
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
        "#,
        params![
            &event.event_id,
            &event.session_id,
            &event.agent_type,
            event.event_type.as_str(),
            &event.tool_name,
            event.status.as_str(),
            event.tokens_in as i64,
            event.tokens_out as i64,
            event.cache_read_tokens as i64,
            event.cache_write_tokens as i64,
            event.duration_ms.map(|d| d as i64),
            &event.model,
            event.cost_usd,
            &event.project,
            &event.branch,
            event.source.map(|s| s.as_str()),
            &event.client_timestamp,
            created_at,
            metadata,
            event.payload_truncated as i64,
        ],
    )?;

    if changed == 0 {
        Ok(None)
    } else {
        Ok(Some(conn.last_insert_rowid()))
    }
}

pub fn exists_by_event_id(conn: &Connection, event_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE event_id = ?1",
        [event_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<EventRecord>> {
    let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1");
    let mut stmt = conn.prepare(&query)?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => Ok(Some(map_event(row)?)),
        None => Ok(None),
    }
}

/// Filterable event listing, newest first. Returns the page plus the
/// total match count for the same filter set.
pub fn query(conn: &Connection, filter: &EventQuery) -> Result<(Vec<EventRecord>, u64)> {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    let equality_filters = [
        ("agent_type = ?", &filter.agent_type),
        ("event_type = ?", &filter.event_type),
        ("tool_name = ?", &filter.tool_name),
        ("session_id = ?", &filter.session_id),
        ("branch = ?", &filter.branch),
        ("model = ?", &filter.model),
        ("source = ?", &filter.source),
        ("created_at >= ?", &filter.since),
        ("created_at <= ?", &filter.until),
    ];
    for (clause, value) in equality_filters {
        if let Some(v) = value {
            where_clauses.push(clause);
            params.push(Box::new(v.clone()));
        }
    }

    let where_clause = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let count_query = format!("SELECT COUNT(*) FROM events {where_clause}");
    let total: i64 = conn.query_row(&count_query, param_refs.as_slice(), |row| row.get(0))?;

    // limit 0 means unbounded; SQLite treats a negative LIMIT the same way.
    let limit = filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    let limit_sql = if limit == 0 { -1 } else { limit as i64 };
    let offset = filter.offset.unwrap_or(0) as i64;

    let query = format!(
        "SELECT {EVENT_COLUMNS} FROM events {where_clause} \
         ORDER BY created_at DESC, id DESC LIMIT {limit_sql} OFFSET {offset}"
    );

    let mut stmt = conn.prepare(&query)?;
    let events = stmt
        .query_map(param_refs.as_slice(), |row| Ok(map_event(row)))?
        .collect::<std::result::Result<std::result::Result<Vec<_>, _>, _>>()??;

    Ok((events, total as u64))
}

/// Events of one session in ingest order, for transcript projection.
pub fn for_session_chronological(conn: &Connection, session_id: &str) -> Result<Vec<EventRecord>> {
    let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE session_id = ?1 ORDER BY id ASC");
    let mut stmt = conn.prepare(&query)?;
    let events = stmt
        .query_map([session_id], |row| Ok(map_event(row)))?
        .collect::<std::result::Result<std::result::Result<Vec<_>, _>, _>>()??;
    Ok(events)
}

/// Most recent events of one session, newest first.
pub fn recent_for_session(
    conn: &Connection,
    session_id: &str,
    limit: u32,
) -> Result<Vec<EventRecord>> {
    let query = format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&query)?;
    let events = stmt
        .query_map(params![session_id, limit as i64], |row| Ok(map_event(row)))?
        .collect::<std::result::Result<std::result::Result<Vec<_>, _>, _>>()??;
    Ok(events)
}

/// Row shape consumed by the cost recalculation walk.
#[derive(Debug, Clone)]
pub struct CostedRow {
    pub id: i64,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

pub fn list_costed_rows(conn: &Connection) -> Result<Vec<CostedRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, model, tokens_in, tokens_out, cache_read_tokens, cache_write_tokens
         FROM events WHERE model IS NOT NULL ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CostedRow {
                id: row.get(0)?,
                model: row.get(1)?,
                tokens_in: row.get::<_, i64>(2)? as u64,
                tokens_out: row.get::<_, i64>(3)? as u64,
                cache_read_tokens: row.get::<_, i64>(4)? as u64,
                cache_write_tokens: row.get::<_, i64>(5)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_cost(conn: &Connection, id: i64, cost_usd: Option<f64>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE events SET cost_usd = ?2 WHERE id = ?1",
        params![id, cost_usd],
    )?;
    Ok(changed > 0)
}

fn map_event(row: &Row<'_>) -> Result<EventRecord> {
    let event_type_raw: String = row.get(4)?;
    let event_type = EventType::parse(&event_type_raw)
        .ok_or_else(|| Error::Query(format!("unknown event_type in store: {event_type_raw}")))?;

    let status_raw: String = row.get(6)?;
    let status = EventStatus::parse(&status_raw)
        .ok_or_else(|| Error::Query(format!("unknown status in store: {status_raw}")))?;

    let source: Option<String> = row.get(16)?;
    let metadata: Option<String> = row.get(19)?;
    let metadata = match metadata {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| Error::Query(e.to_string()))?,
        None => serde_json::Value::Null,
    };

    Ok(EventRecord {
        id: row.get(0)?,
        event_id: row.get(1)?,
        session_id: row.get(2)?,
        agent_type: row.get(3)?,
        event_type,
        tool_name: row.get(5)?,
        status,
        tokens_in: row.get::<_, i64>(7)? as u64,
        tokens_out: row.get::<_, i64>(8)? as u64,
        cache_read_tokens: row.get::<_, i64>(9)? as u64,
        cache_write_tokens: row.get::<_, i64>(10)? as u64,
        duration_ms: row.get::<_, Option<i64>>(11)?.map(|d| d as u64),
        model: row.get(12)?,
        cost_usd: row.get(13)?,
        project: row.get(14)?,
        branch: row.get(15)?,
        source: source.as_deref().and_then(SourceTag::parse),
        client_timestamp: row.get(17)?,
        created_at: row.get(18)?,
        metadata,
        payload_truncated: row.get::<_, i64>(20)? != 0,
    })
}
