//! keyfan workload simulator
//!
//! Drives a keyed distributor with concurrent producers and churning
//! watchers, then checks routing and channel cleanup.

mod config;
mod events;
mod relay;
mod shutdown;
mod simulation;
mod state;

use clap::Parser;
use config::{CliOverrides, ConfigLoader};
use shutdown::spawn_shutdown_handler;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// keyfan-sim - Soak test for keyed event fan-out
#[derive(Parser, Debug)]
#[command(name = "keyfan-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./keyfan-sim.toml")]
    config: PathBuf,

    /// Override the seed used to pick orders
    #[arg(short, long)]
    seed: Option<u64>,

    /// Override the number of updates each producer submits
    #[arg(short, long)]
    updates: Option<u64>,

    /// Print the final report as JSON on stdout
    #[arg(long, default_value = "false")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting keyfan-sim v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(
        &args.config,
        CliOverrides {
            seed: args.seed,
            updates_per_producer: args.updates,
        },
    );
    let sim_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!(?sim_config, "Configuration loaded");

    // Spawn signal handler (SIGINT/SIGTERM stop the producers early)
    let (shutdown_rx, done_notify) = spawn_shutdown_handler();

    let report = simulation::run(&sim_config, shutdown_rx).await;

    // Signal the handler to stop
    done_notify.notify_one();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        tracing::info!(
            submitted = report.submitted,
            completed_immediately = report.completed_immediately,
            delivered = report.delivered,
            resubscribes = report.resubscribes,
            completion_timeouts = report.completion_timeouts,
            elapsed_ms = report.elapsed_ms,
            "Simulation finished"
        );
    }

    if !report.is_clean() {
        tracing::error!(
            key_violations = report.key_violations,
            live_keys_after = report.live_keys_after,
            "Simulation detected routing or cleanup errors"
        );
        anyhow::bail!(
            "simulation failed: {} key violations, {} channels left alive",
            report.key_violations,
            report.live_keys_after
        );
    }

    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keyfan_core=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
