use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dispute_core::api::{router, ApiState};
use dispute_core::clock::SystemClock;
use dispute_core::config::Config;
use dispute_core::orchestrator::Orchestrator;
use dispute_core::persistence::Store;
use dispute_core::scheduler::Scheduler;
use dispute_core::workers::WorkerPool;

#[derive(Parser)]
#[command(name = "dispute-core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Address the command API binds to.
    #[arg(long, env = "CORE_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the command API, scheduler, and background workers.
    Serve,
    /// Opens the store and prints its keyspace stats.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).json().init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let store = Store::open(&config.db_path)?;

    match cli.command {
        Commands::Migrate => {
            let keys = store.scan_prefix::<serde_json::Value>("")?;
            tracing::info!(key_count = keys.len(), "store opened");
            Ok(())
        }
        Commands::Serve => serve(cli.bind_addr, store, config).await,
    }
}

async fn serve(bind_addr: String, store: Store, config: Config) -> anyhow::Result<()> {
    let current_year = chrono::Utc::now().format("%Y").to_string().parse().unwrap_or(2026);
    let holidays = [current_year - 1, current_year, current_year + 1]
        .into_iter()
        .flat_map(Config::federal_holidays)
        .collect();
    let clock = Arc::new(SystemClock::new(config.business_tz(), holidays));

    let tenant_max_concurrency = config.tenant_max_concurrency;
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), clock.clone(), config));

    let scheduler = Scheduler::new(store, orchestrator.task_queue.clone(), clock.clone());
    let workers = Arc::new(WorkerPool::new(orchestrator.clone(), tenant_max_concurrency));

    let scheduler_handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            loop {
                if let Err(e) = orchestrator.drive_time_forward(&scheduler) {
                    tracing::error!(?e, "scheduler tick failed");
                }
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
        }
    });

    let worker_handle = tokio::spawn({
        let workers = workers.clone();
        async move {
            loop {
                let found = workers.run_once("worker-1").await;
                if !found {
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                }
            }
        }
    });

    let events_handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        let mut receiver = orchestrator.bus.subscribe();
        async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if let Err(e) = orchestrator.route_event(&event) {
                            tracing::error!(?e, event_type = %event.event_type, "event routing failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event bus subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });

    let app = router(ApiState { orchestrator }).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "dispute orchestration core listening");

    axum::serve(listener, app).await?;
    scheduler_handle.abort();
    worker_handle.abort();
    events_handle.abort();
    Ok(())
}
