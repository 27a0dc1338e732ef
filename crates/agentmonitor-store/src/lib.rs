// SQLite store for the agentmonitor hub. Owns the schema, the
// migrations, and every SQL statement; nothing outside this crate
// speaks SQL.

mod db;
mod error;
mod schema;

pub mod queries;

pub use db::Store;
pub use error::{Error, Result};
pub use queries::events::{CostedRow, DEFAULT_QUERY_LIMIT};
pub use queries::import::content_hash;
pub use queries::stats::StatsScope;

use agentmonitor_types::{
    AgentRecord, CostBreakdown, EventQuery, EventRecord, FilterOptions, ImportStateRecord,
    SessionQuery, SessionRecord, StatsSnapshot, ToolStat,
};

impl Store {
    pub fn events(&self, filter: &EventQuery) -> Result<(Vec<EventRecord>, u64)> {
        self.read(|conn| queries::events::query(conn, filter))
    }

    pub fn event_by_id(&self, id: i64) -> Result<Option<EventRecord>> {
        self.read(|conn| queries::events::get_by_id(conn, id))
    }

    pub fn session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.read(|conn| queries::sessions::get_by_id(conn, session_id))
    }

    pub fn sessions(&self, filter: &SessionQuery) -> Result<(Vec<SessionRecord>, u64)> {
        self.read(|conn| queries::sessions::list(conn, filter))
    }

    pub fn session_events(&self, session_id: &str) -> Result<Vec<EventRecord>> {
        self.read(|conn| queries::events::for_session_chronological(conn, session_id))
    }

    pub fn session_events_recent(&self, session_id: &str, limit: u32) -> Result<Vec<EventRecord>> {
        self.read(|conn| queries::events::recent_for_session(conn, session_id, limit))
    }

    pub fn agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        self.read(|conn| queries::agents::get_by_id(conn, id))
    }

    pub fn stats_snapshot(&self, scope: &StatsScope) -> Result<StatsSnapshot> {
        self.read(|conn| queries::stats::snapshot(conn, scope))
    }

    pub fn tool_stats(&self, scope: &StatsScope) -> Result<Vec<ToolStat>> {
        self.read(|conn| queries::stats::tool_stats(conn, scope))
    }

    pub fn cost_breakdown(
        &self,
        scope: &StatsScope,
        hourly: bool,
        top_n: u32,
    ) -> Result<CostBreakdown> {
        self.read(|conn| queries::stats::cost_breakdown(conn, scope, hourly, top_n))
    }

    pub fn filter_options(&self) -> Result<FilterOptions> {
        self.read(queries::stats::filter_options)
    }

    pub fn usage_totals(&self, agent_type: &str, window_start: &str) -> Result<(u64, f64)> {
        self.read(|conn| queries::stats::usage_totals(conn, agent_type, window_start))
    }

    pub fn import_state(&self, source: &str, file_path: &str) -> Result<Option<ImportStateRecord>> {
        self.read(|conn| queries::import::get(conn, source, file_path))
    }

    pub fn set_import_state(&self, state: &ImportStateRecord) -> Result<()> {
        self.write_tx(|tx| queries::import::upsert(tx, state))
    }

    /// One sweep pass: demote stale active sessions to idle, finalize
    /// stale idle sessions to ended. Both statements share a
    /// transaction; returns (idled, ended) change counts.
    pub fn sweep_sessions(
        &self,
        idle_cutoff: &str,
        end_cutoff: &str,
        now: &str,
    ) -> Result<(u64, u64)> {
        self.write_tx(|tx| {
            let idled = queries::sessions::sweep_idle(tx, idle_cutoff)?;
            let ended = queries::sessions::sweep_ended(tx, end_cutoff, now)?;
            Ok((idled, ended))
        })
    }
}
