//! qgjob server: accepts test jobs over HTTP, batches them by app version
//! and runs them on the device pool.

use clap::Parser;
use qgjob_api::ApiServer;
use qgjob_core::config::{AppConfig, RunnerKind};
use qgjob_scheduler::{JobStore, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "qgjob-server")]
#[command(about = "Priority scheduler for mobile UI test jobs")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "QGJOB__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "QGJOB__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Number of batch workers (overrides config)
    #[arg(long, env = "QGJOB__QUEUE__WORKERS")]
    workers: Option<usize>,

    /// Replace the device pool with the built-in lab layout
    #[arg(long, default_value_t = false)]
    seed_devices: bool,

    /// JSON snapshot file for jobs and devices (overrides config)
    #[arg(long, env = "QGJOB__STORE__SNAPSHOT_PATH")]
    snapshot: Option<PathBuf>,

    /// Ignore any existing snapshot and start empty
    #[arg(long, default_value_t = false)]
    reset_state: bool,

    /// Test runner: simulated or appwright (overrides config)
    #[arg(long, value_parser = parse_runner)]
    runner: Option<RunnerKind>,
}

fn parse_runner(raw: &str) -> Result<RunnerKind, String> {
    match raw.trim().to_lowercase().as_str() {
        "simulated" => Ok(RunnerKind::Simulated),
        "appwright" => Ok(RunnerKind::Appwright),
        other => Err(format!("unknown runner '{other}', expected simulated or appwright")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qgjob=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("qgjob server starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(workers) = cli.workers {
        config.queue.workers = workers;
    }
    if let Some(path) = cli.snapshot {
        config.store.snapshot_path = Some(path);
    }
    if let Some(kind) = cli.runner {
        config.runner.kind = kind;
    }
    if cli.seed_devices {
        config.devices.seed_default_pool = true;
    }

    info!(
        node_id = %config.node_id,
        workers = config.queue.workers,
        http_port = config.api.http_port,
        runner = ?config.runner.kind,
        snapshot = ?config.store.snapshot_path,
        "Configuration loaded"
    );

    let store = match (&config.store.snapshot_path, cli.reset_state) {
        (Some(path), false) => Arc::new(JobStore::load(path)?),
        _ => Arc::new(JobStore::new()),
    };

    let scheduler = Arc::new(Scheduler::new(config.clone(), store.clone()));
    if config.devices.seed_default_pool || store.devices().is_empty() {
        scheduler.devices().seed_default_pool();
    }
    scheduler.start();

    let api_server = ApiServer::new(config.clone(), scheduler.clone());

    if config.metrics.enabled {
        if let Err(e) = api_server.start_metrics().await {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    // Periodic snapshot flush
    if let Some(path) = config.store.snapshot_path.clone() {
        let store = store.clone();
        let every = Duration::from_secs(config.store.flush_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = store.save(&path) {
                    error!(error = %e, path = %path.display(), "Snapshot flush failed");
                }
            }
        });
    }

    // Periodic device health check
    {
        let scheduler = scheduler.clone();
        let every = Duration::from_secs(config.devices.health_check_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let report = scheduler.devices().health_check().await;
                if report.unhealthy > 0 {
                    warn!(unhealthy = report.unhealthy, "Unhealthy devices found");
                }
            }
        });
    }

    info!("qgjob server is ready to accept jobs");

    api_server.start_http(shutdown_signal()).await?;

    info!("Shutting down");
    scheduler.shutdown().await;
    if let Some(path) = &config.store.snapshot_path {
        match store.save(path) {
            Ok(()) => info!(path = %path.display(), "Snapshot written"),
            Err(e) => error!(error = %e, path = %path.display(), "Final snapshot failed"),
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
