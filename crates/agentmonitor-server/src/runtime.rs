//! Process lifecycle: startup ordering, periodic tasks, and graceful
//! shutdown. Background task failures are logged and swallowed; the
//! task picks up again on its next tick.

use std::sync::Arc;
use std::time::Duration;

use agentmonitor_engine::{Ingestor, time::to_canonical};
use agentmonitor_store::{StatsScope, Store};
use agentmonitor_types::StreamMessage;
use anyhow::Context;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::routes;
use crate::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub files: usize,
    pub records: usize,
}

/// Seam for the historical-log importer collaborator. Implementations
/// submit normalized events through the shared ingest path and use the
/// store's import_state table to stay idempotent.
pub trait Importer: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, ingestor: &Ingestor) -> anyhow::Result<ImportSummary>;
}

/// Build the full application state and router without binding a
/// socket. Test harnesses drive the router directly.
pub fn build(config: Config) -> anyhow::Result<(Arc<AppState>, axum::Router)> {
    let store = Store::open(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    store.health_check().context("database health check failed")?;

    // Touch the tables before the first request so a corrupt embedded
    // file fails startup, not an ingest.
    let _ = agentmonitor_pricing::Pricing::global();

    let state = AppState::new(config, Arc::new(store));
    let router = routes::router(Arc::clone(&state));
    Ok((state, router))
}

/// Full startup sequence: config, store, pricing, hub, HTTP bind,
/// periodic tasks. Runs until a termination signal, then drains
/// subscribers and stops the tasks.
pub async fn run(config: Config, importer: Option<Arc<dyn Importer>>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let (state, router) = build(config)?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "agentmonitor listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = spawn_periodic_tasks(&state, importer, shutdown_rx);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Stop accepting work, then tear down in reverse order of startup
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    state.hub.close_all();
    tracing::info!("agentmonitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("termination signal received");
}

fn spawn_periodic_tasks(
    state: &Arc<AppState>,
    importer: Option<Arc<dyn Importer>>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    tasks.push(spawn_stats_broadcast(
        Arc::clone(state),
        shutdown.clone(),
    ));
    tasks.push(spawn_idle_sweeper(Arc::clone(state), shutdown.clone()));

    if let Some(importer) = importer
        && state.config.auto_import_minutes > 0
    {
        tasks.push(spawn_auto_import(Arc::clone(state), importer, shutdown));
    }

    tasks
}

/// Recompute the unfiltered stats snapshot on a fixed cadence and fan
/// it out as a `stats` frame.
fn spawn_stats_broadcast(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(state.config.stats_interval_ms.max(100)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match state.store.stats_snapshot(&StatsScope::default()) {
                        Ok(stats) => state.hub.publish(&StreamMessage::Stats { stats }),
                        Err(err) => tracing::warn!(error = %err, "stats broadcast failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

/// Demote sessions past the idle threshold and finalize them past twice
/// that threshold, broadcasting one session_update when anything moved.
fn spawn_idle_sweeper(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Utc::now();
                    let idle_secs = state.config.idle_threshold_secs() as i64;
                    let idle_cutoff = to_canonical(now - chrono::Duration::seconds(idle_secs));
                    let end_cutoff = to_canonical(now - chrono::Duration::seconds(idle_secs * 2));
                    match state.store.sweep_sessions(&idle_cutoff, &end_cutoff, &to_canonical(now)) {
                        Ok((idled, ended)) => {
                            if idled + ended > 0 {
                                tracing::debug!(idled, ended, "idle sweep");
                                state.hub.publish(&StreamMessage::SessionUpdate {
                                    session_id: None,
                                    status: None,
                                    idled,
                                    ended,
                                });
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "idle sweep failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

fn spawn_auto_import(
    state: Arc<AppState>,
    importer: Arc<dyn Importer>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(
            state.config.auto_import_minutes * 60,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let ingestor = state.ingestor.clone();
                    let importer = Arc::clone(&importer);
                    let name = importer.name().to_string();
                    let result = tokio::task::spawn_blocking(move || importer.run(&ingestor)).await;
                    match result {
                        Ok(Ok(summary)) => tracing::info!(
                            importer = %name,
                            files = summary.files,
                            records = summary.records,
                            "auto-import finished"
                        ),
                        Ok(Err(err)) => tracing::warn!(importer = %name, error = %err, "auto-import failed"),
                        Err(err) => tracing::warn!(importer = %name, error = %err, "auto-import panicked"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}
