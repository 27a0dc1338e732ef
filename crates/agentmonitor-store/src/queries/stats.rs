use std::collections::BTreeMap;

use agentmonitor_types::{
    BranchOption, CostBreakdown, CostBucket, FilterOptions, ModelCost, ProjectCost, StatsSnapshot,
    ToolStat,
};
use rusqlite::Connection;

use crate::Result;

/// Shared (agent kind, since) scope applied to event-level aggregates.
#[derive(Debug, Clone, Default)]
pub struct StatsScope {
    pub agent_type: Option<String>,
    pub since: Option<String>,
}

impl StatsScope {
    fn where_clause(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(agent_type) = &self.agent_type {
            clauses.push("agent_type = ?");
            params.push(Box::new(agent_type.clone()));
        }
        if let Some(since) = &self.since {
            clauses.push("created_at >= ?");
            params.push(Box::new(since.clone()));
        }
        let clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        (clause, params)
    }
}

pub fn snapshot(conn: &Connection, scope: &StatsScope) -> Result<StatsSnapshot> {
    let (where_clause, params) = scope.where_clause();
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let totals_query = format!(
        "SELECT COUNT(*),
                COALESCE(SUM(tokens_in), 0),
                COALESCE(SUM(tokens_out), 0),
                COALESCE(SUM(cost_usd), 0.0)
         FROM events {where_clause}"
    );
    let (total_events, total_tokens_in, total_tokens_out, total_cost_usd) =
        conn.query_row(&totals_query, param_refs.as_slice(), |row| {
            Ok((
                row.get::<_, i64>(0)? as u64,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, f64>(3)?,
            ))
        })?;

    let session_clause = match &scope.agent_type {
        Some(_) => "WHERE agent_type = ?",
        None => "",
    };
    let session_params: Vec<&dyn rusqlite::ToSql> = match &scope.agent_type {
        Some(agent_type) => vec![agent_type as &dyn rusqlite::ToSql],
        None => Vec::new(),
    };
    let (active_sessions, total_sessions) = conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(status = 'active'), 0), COUNT(*) FROM sessions {session_clause}"
        ),
        session_params.as_slice(),
        |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
    )?;

    let tool_breakdown = grouped_counts(
        conn,
        &format!(
            "SELECT tool_name, COUNT(*) FROM events {where_clause}
             {} tool_name IS NOT NULL GROUP BY tool_name",
            if where_clause.is_empty() { "WHERE" } else { "AND" }
        ),
        param_refs.as_slice(),
    )?;

    let agent_breakdown = grouped_counts(
        conn,
        &format!("SELECT agent_type, COUNT(*) FROM events {where_clause} GROUP BY agent_type"),
        param_refs.as_slice(),
    )?;

    let model_breakdown = grouped_counts(
        conn,
        &format!(
            "SELECT model, COUNT(*) FROM events {where_clause}
             {} model IS NOT NULL GROUP BY model",
            if where_clause.is_empty() { "WHERE" } else { "AND" }
        ),
        param_refs.as_slice(),
    )?;

    let branches_query = format!(
        "SELECT branch FROM events {where_clause}
         {} branch IS NOT NULL GROUP BY branch ORDER BY MAX(created_at) DESC",
        if where_clause.is_empty() { "WHERE" } else { "AND" }
    );
    let mut stmt = conn.prepare(&branches_query)?;
    let branches = stmt
        .query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(StatsSnapshot {
        total_events,
        active_sessions,
        total_sessions,
        total_tokens_in,
        total_tokens_out,
        total_cost_usd,
        tool_breakdown,
        agent_breakdown,
        model_breakdown,
        branches,
    })
}

pub fn tool_stats(conn: &Connection, scope: &StatsScope) -> Result<Vec<ToolStat>> {
    let (where_clause, params) = scope.where_clause();
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let and = if where_clause.is_empty() { "WHERE" } else { "AND" };

    let query = format!(
        "SELECT tool_name,
                COUNT(*),
                COALESCE(SUM(status = 'error'), 0),
                AVG(duration_ms)
         FROM events {where_clause} {and} tool_name IS NOT NULL
         GROUP BY tool_name ORDER BY COUNT(*) DESC"
    );
    let mut stmt = conn.prepare(&query)?;
    let mut tools = stmt
        .query_map(param_refs.as_slice(), |row| {
            let total_calls = row.get::<_, i64>(1)? as u64;
            let error_count = row.get::<_, i64>(2)? as u64;
            Ok(ToolStat {
                tool_name: row.get(0)?,
                total_calls,
                error_count,
                error_rate: if total_calls > 0 {
                    error_count as f64 / total_calls as f64
                } else {
                    0.0
                },
                avg_duration_ms: row.get(3)?,
                by_agent: BTreeMap::new(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let by_agent_query = format!(
        "SELECT tool_name, agent_type, COUNT(*)
         FROM events {where_clause} {and} tool_name IS NOT NULL
         GROUP BY tool_name, agent_type"
    );
    let mut stmt = conn.prepare(&by_agent_query)?;
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (tool_name, agent_type, count) in rows {
        if let Some(tool) = tools.iter_mut().find(|t| t.tool_name == tool_name) {
            tool.by_agent.insert(agent_type, count);
        }
    }

    Ok(tools)
}

/// Cost rollups: a time bucket series plus top-N projects and models.
/// `hourly` picks the bucket resolution; the caller derives it from the
/// requested range.
pub fn cost_breakdown(
    conn: &Connection,
    scope: &StatsScope,
    hourly: bool,
    top_n: u32,
) -> Result<CostBreakdown> {
    let (where_clause, params) = scope.where_clause();
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let and = if where_clause.is_empty() { "WHERE" } else { "AND" };

    let bucket_expr = if hourly {
        "strftime('%Y-%m-%dT%H:00', created_at)"
    } else {
        "strftime('%Y-%m-%d', created_at)"
    };

    let timeline_query = format!(
        "SELECT {bucket_expr} AS bucket, COALESCE(SUM(cost_usd), 0.0), COUNT(*)
         FROM events {where_clause} {and} cost_usd IS NOT NULL
         GROUP BY bucket ORDER BY bucket ASC"
    );
    let mut stmt = conn.prepare(&timeline_query)?;
    let timeline = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(CostBucket {
                bucket: row.get(0)?,
                cost_usd: row.get(1)?,
                events: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let by_project_query = format!(
        "SELECT project, COALESCE(SUM(cost_usd), 0.0) AS cost, COUNT(*)
         FROM events {where_clause} {and} cost_usd IS NOT NULL AND project IS NOT NULL
         GROUP BY project ORDER BY cost DESC LIMIT {top_n}"
    );
    let mut stmt = conn.prepare(&by_project_query)?;
    let by_project = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(ProjectCost {
                project: row.get(0)?,
                cost_usd: row.get(1)?,
                events: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let by_model_query = format!(
        "SELECT model, COALESCE(SUM(cost_usd), 0.0) AS cost, COUNT(*)
         FROM events {where_clause} {and} cost_usd IS NOT NULL AND model IS NOT NULL
         GROUP BY model ORDER BY cost DESC LIMIT {top_n}"
    );
    let mut stmt = conn.prepare(&by_model_query)?;
    let by_model = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(ModelCost {
                model: row.get(0)?,
                cost_usd: row.get(1)?,
                events: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(CostBreakdown {
        timeline,
        by_project,
        by_model,
    })
}

pub fn filter_options(conn: &Connection) -> Result<FilterOptions> {
    let distinct = |query: &str| -> Result<Vec<String>> {
        let mut stmt = conn.prepare(query)?;
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(values)
    };

    let mut stmt = conn.prepare(
        "SELECT branch, MAX(created_at) FROM events WHERE branch IS NOT NULL
         GROUP BY branch ORDER BY MAX(created_at) DESC",
    )?;
    let branches = stmt
        .query_map([], |row| {
            Ok(BranchOption {
                value: row.get(0)?,
                last_seen: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(FilterOptions {
        agent_types: distinct("SELECT DISTINCT agent_type FROM events ORDER BY agent_type")?,
        event_types: distinct("SELECT DISTINCT event_type FROM events ORDER BY event_type")?,
        tool_names: distinct(
            "SELECT DISTINCT tool_name FROM events WHERE tool_name IS NOT NULL ORDER BY tool_name",
        )?,
        models: distinct("SELECT DISTINCT model FROM events WHERE model IS NOT NULL ORDER BY model")?,
        projects: distinct(
            "SELECT DISTINCT project FROM events WHERE project IS NOT NULL ORDER BY project",
        )?,
        branches,
        sources: distinct("SELECT DISTINCT source FROM events WHERE source IS NOT NULL ORDER BY source")?,
    })
}

/// Token and cost sums for one agent kind since a window start.
pub fn usage_totals(conn: &Connection, agent_type: &str, window_start: &str) -> Result<(u64, f64)> {
    conn.query_row(
        "SELECT COALESCE(SUM(tokens_in + tokens_out), 0), COALESCE(SUM(cost_usd), 0.0)
         FROM events WHERE agent_type = ?1 AND created_at >= ?2",
        [agent_type, window_start],
        |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, f64>(1)?)),
    )
    .map_err(Into::into)
}

fn grouped_counts(
    conn: &Connection,
    query: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(query)?;
    let mut map = BTreeMap::new();
    let rows = stmt
        .query_map(params, |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (key, count) in rows {
        map.insert(key, count);
    }
    Ok(map)
}
