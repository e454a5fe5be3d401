use anyhow::Context;
use clap::{Parser, Subcommand};
use ecr_sync::config::Config;
use ecr_sync::coordinator::{CoordinatorSettings, PollingCoordinator};
use ecr_sync::infra::{ReqwestIndexService, ReqwestPacerClient};
use ecr_sync::intake::BulkIntakeProcessor;
use ecr_sync::locks::RecordLocks;
use ecr_sync::logging;
use ecr_sync::runner::Runner;
use ecr_sync::storage::{InMemoryStorage, Storage};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "ecr-sync")]
#[command(about = "Electronic case report reconciliation and PACER polling service")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file (default: ecr-sync.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    metrics_addr: Option<SocketAddr>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling and bulk intake loops until Ctrl-C
    Run,
    /// Run a single polling pass
    PollOnce,
    /// Run one bulk intake sweep
    IngestOnce {
        /// Intake directory (defaults to LOCAL_BULKDATA_PATH)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn build_coordinator(
    config: &Config,
    storage: Arc<dyn Storage>,
    locks: RecordLocks,
) -> anyhow::Result<PollingCoordinator> {
    let index_url = config.index_service_url()?;
    let index = ReqwestIndexService::new(&index_url, config.request_timeout())?;
    let client = ReqwestPacerClient::new(config.request_timeout(), config.trust_cert)?;
    Ok(PollingCoordinator::new(
        storage,
        Arc::new(index),
        Arc::new(client),
        locks,
        CoordinatorSettings {
            rearm_interval: config.rearm_interval(),
            max_concurrent_batches: config.max_concurrent_batches,
        },
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let _guard = logging::init_logging(&config.log_dir);

    if let Some(addr) = cli.metrics_addr {
        ecr_sync::metrics::init(addr)?;
    }

    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let locks = RecordLocks::new();

    match cli.command {
        Commands::Run => {
            let coordinator = build_coordinator(&config, storage.clone(), locks.clone())?;
            let mut runner = Runner::new(coordinator, config.poll_interval());
            match config.intake_dir() {
                Some(dir) => {
                    let processor =
                        BulkIntakeProcessor::new(storage, locks, config.rearm_interval());
                    runner = runner.with_intake(processor, dir, config.intake_interval());
                }
                None => warn!("LOCAL_PACER_URL or LOCAL_BULKDATA_PATH not set; bulk intake is off"),
            }

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            });

            runner.run(shutdown_rx).await?;
        }
        Commands::PollOnce => {
            let coordinator = build_coordinator(&config, storage, locks)?;
            let summary = coordinator.run_pass().await?;
            println!("Polling pass results:");
            println!("   Jobs due: {}", summary.jobs_due);
            println!("   Skipped: {}", summary.jobs_skipped);
            println!("   Batches: {}", summary.batches);
            println!("   Applied: {}", summary.applied);
            println!("   No data: {}", summary.empty_results);
            println!("   Rejected (W): {}", summary.rejected);
            println!("   Failed (E): {}", summary.failed);
            println!("   Unmatched: {}", summary.unmatched);
            println!("   Ambiguous: {}", summary.ambiguous);
        }
        Commands::IngestOnce { dir } => {
            let Some(dir) = dir.or_else(|| config.intake_dir()) else {
                anyhow::bail!("no intake directory: pass --dir or set LOCAL_BULKDATA_PATH and LOCAL_PACER_URL");
            };
            let processor = BulkIntakeProcessor::new(storage, locks, config.rearm_interval());
            let summary = processor.process_dir(&dir).await?;
            println!("Bulk intake results for {}:", dir.display());
            println!("   Files consumed: {}", summary.files);
            println!("   Lines: {}", summary.lines);
            println!("   Created: {}", summary.created);
            println!("   Merged: {}", summary.merged);
            println!("   Ambiguous: {}", summary.ambiguous);
            println!("   Skipped: {}", summary.skipped);
        }
    }
    Ok(())
}
