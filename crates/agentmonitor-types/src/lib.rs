// Schema layer for the agentmonitor hub.
// Contains only serializable shapes shared across store, engine, and server.

mod agent;
mod event;
mod session;
mod stats;
mod stream;

pub use agent::AgentRecord;
pub use event::{
    EventQuery, EventRecord, EventStatus, EventType, FieldError, NormalizedEvent, SourceTag,
};
pub use session::{ImportStateRecord, SessionQuery, SessionRecord, SessionStatus};
pub use stats::{
    BranchOption, CostBreakdown, CostBucket, FilterOptions, LimitType, ModelCost, ProjectCost,
    StatsSnapshot, ToolStat, UsageReport, UsageWindow,
};
pub use stream::{ClientFilter, StreamMessage};
