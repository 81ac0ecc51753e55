//! Conveyor Worker
//!
//! Polls the job queue, executes pipelines and streams status snapshots to
//! the server's internal notify endpoint.

use anyhow::{Context, Result};
use conveyor_client::ServerClient;
use conveyor_core::ProgressWeighting;
use conveyor_store::{JobStore, PgStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conveyor_worker::config::Config;
use conveyor_worker::context::WorkerContext;
use conveyor_worker::handlers;
use conveyor_worker::notify::{DispatchQueue, NotificationDispatcher, Notifier, RetryPolicy};
use conveyor_worker::pipeline::{HandlerRegistry, PipelineExecutor};
use conveyor_worker::scheduler::JobPoller;

/// How long to wait for queued snapshots to flush on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Conveyor Worker");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    info!(
        "Loaded configuration: worker_id={}, server_url={}",
        config.worker_id, config.server_url
    );

    let store: Arc<dyn JobStore> = Arc::new(connect_with_retry(&config.database_url).await?);
    info!("Database connection established");

    let client = ServerClient::with_timeout(config.server_url.clone(), config.notify_timeout)
        .context("Failed to build HTTP client")?
        .with_api_key(config.internal_api_key.clone());
    let dispatcher = NotificationDispatcher::new(
        Arc::new(client),
        RetryPolicy {
            max_attempts: config.notify_max_attempts,
            initial_backoff: config.notify_initial_backoff,
        },
    );
    let (queue, drain_handle) = DispatchQueue::spawn(dispatcher, config.notify_queue_size);
    let notifier: Arc<dyn Notifier> = Arc::new(queue);

    let ctx = WorkerContext::new(
        store,
        notifier,
        ProgressWeighting::new(config.running_step_weight),
    );

    let mut registry = HandlerRegistry::new();
    handlers::register_builtin(&mut registry);
    let executor = Arc::new(PipelineExecutor::new(Arc::clone(&ctx), Arc::new(registry)));

    let poller = JobPoller::new(config, ctx, executor);

    info!("Worker initialized, starting job polling loop");
    if let Err(e) = poller.run(shutdown_signal()).await {
        error!("Poller error: {:#}", e);
        return Err(e);
    }

    // Dropping the last notifier handle closes the queue
    drop(poller);
    if tokio::time::timeout(DRAIN_TIMEOUT, drain_handle).await.is_err() {
        warn!("Timed out flushing pending snapshots");
    }

    info!("Worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Connects to the database with exponential backoff
///
/// The database may not be ready yet when the worker starts (common in
/// container environments).
async fn connect_with_retry(database_url: &str) -> Result<PgStore> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match PgStore::connect(database_url).await {
            Ok(store) => return Ok(store),
            Err(e) if attempt >= MAX_RETRIES => {
                return Err(e).context(format!(
                    "Failed to connect to database after {} attempts",
                    MAX_RETRIES
                ));
            }
            Err(e) => {
                warn!(
                    "Failed to connect to database (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
