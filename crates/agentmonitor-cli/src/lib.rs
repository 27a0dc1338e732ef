use agentmonitor_pricing::Pricing;
use agentmonitor_server::Config;
use agentmonitor_store::Store;
use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "agentmonitor",
    version,
    about = "Local-first observability hub for AI coding agents"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the hub: ingest API, live stream, and dashboard endpoints
    Serve,

    /// Rewrite cost_usd across stored events from the current pricing tables
    RecalculateCosts,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(agentmonitor_server::run(config, None))
        }
        Command::RecalculateCosts => {
            let store = Store::open(&config.db_path).with_context(|| {
                format!("failed to open database at {}", config.db_path.display())
            })?;
            let updated = agentmonitor_engine::recalculate_costs(&store, Pricing::global())?;
            println!("Recalculated cost for {updated} events");
            Ok(())
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agentmonitor=info,agentmonitor_server=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
