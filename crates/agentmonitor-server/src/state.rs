//! Process-wide service registry, constructed once at startup and
//! passed explicitly to every request handler.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use agentmonitor_engine::{DeltaTracker, Ingestor};
use agentmonitor_pricing::Pricing;
use agentmonitor_store::Store;

use crate::config::Config;
use crate::git::BranchResolver;
use crate::sse::SseHub;

pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub ingestor: Ingestor,
    pub hub: Arc<SseHub>,
    pub branches: BranchResolver,
    /// OTLP cumulative-to-delta state; resets with the process.
    pub deltas: Mutex<DeltaTracker>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, store: Arc<Store>) -> Arc<Self> {
        let ingestor = Ingestor::new(
            Arc::clone(&store),
            Pricing::global(),
            config.max_payload_bytes(),
        );
        let hub = SseHub::new(config.max_sse_clients, config.live_feed_size);
        let branches = BranchResolver::new(config.projects_root.clone());

        Arc::new(Self {
            config,
            store,
            ingestor,
            hub,
            branches,
            deltas: Mutex::new(DeltaTracker::new()),
            started_at: Instant::now(),
        })
    }
}
