// Ingest + aggregation engine: event normalization, the session
// lifecycle state machine, cost computation, transcript projection,
// and the OTLP adaptation layer.

pub mod contract;
mod error;
pub mod ingest;
pub mod otel;
pub mod recalc;
pub mod sessions;
pub mod time;
pub mod transcript;
pub mod usage;

pub use error::{Error, Result};
pub use ingest::{BatchOutcome, IngestOutcome, IngestStatus, Ingestor, RejectedItem};
pub use otel::DeltaTracker;
pub use recalc::recalculate_costs;
pub use transcript::{TranscriptEntry, TranscriptPayload, TranscriptRole};
pub use usage::{UsageLimit, default_limits, usage_reports};
