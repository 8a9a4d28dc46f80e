//! Vigil Daemon - Predictive monitoring daemon
//!
//! Drives the periodic due-check across monitored services, generating
//! prediction signals and raising alerts for anomalies.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use vigil_common::store::MonitorDb;
use vigild::config::{VigilConfig, CONFIG_PATH};
use vigild::scheduler::GenerationScheduler;
use vigild::triggers::{self, TriggerOutcome};

#[derive(Parser, Debug)]
#[command(name = "vigild", version, about = "Predictive monitoring daemon")]
struct Args {
    /// Config file path
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Override the store path from the config
    #[arg(long)]
    db: Option<PathBuf>,

    /// Override the scheduler tick interval in seconds
    #[arg(long)]
    tick_secs: Option<u64>,

    /// Run a single due-check pass and exit
    #[arg(long)]
    once: bool,
}

fn log_level(config: &VigilConfig) -> Level {
    match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = VigilConfig::load(&args.config);

    tracing_subscriber::fmt()
        .with_max_level(log_level(&config))
        .init();

    info!("Vigil Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let db_path = args
        .db
        .unwrap_or_else(|| PathBuf::from(&config.db_path));
    let db = Arc::new(MonitorDb::open_at(&db_path)?);
    info!("Monitoring store open at {}", db_path.display());

    let tick_secs = args.tick_secs.unwrap_or(config.tick_secs);
    let scheduler = GenerationScheduler::new(db, Duration::from_secs(tick_secs));

    if args.once {
        let outcome = triggers::run_due_check_now(&scheduler).await;
        // Let dispatched workers drain before exiting.
        while scheduler.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if let TriggerOutcome::DueCheckCompleted { dispatched } = outcome {
            info!("Due-check dispatched {dispatched} service(s)");
        }
        return Ok(());
    }

    tokio::spawn(scheduler.run());
    info!("Scheduler running every {tick_secs}s");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");
    Ok(())
}
