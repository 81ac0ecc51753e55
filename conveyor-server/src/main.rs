use anyhow::{Context, Result};
use conveyor_store::{JobStore, PgStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conveyor_server::config::Config;
use conveyor_server::ws::{self, ConnectionRegistry, OwnerAccessPolicy, RegistryConfig};
use conveyor_server::{AppState, create_router};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Conveyor Server...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    tracing::info!("Connecting to database...");
    let store: Arc<dyn JobStore> = Arc::new(
        PgStore::connect(&config.database_url)
            .await
            .context("Failed to initialize database")?,
    );
    tracing::info!("Database ready");

    if config.observer_tokens.is_empty() {
        tracing::warn!("OBSERVER_TOKENS is empty, every observer will be rejected");
    }

    let policy = Arc::new(OwnerAccessPolicy::new(
        config.observer_tokens.clone(),
        Arc::clone(&store),
    ));
    let registry = Arc::new(ConnectionRegistry::new(
        policy,
        RegistryConfig {
            max_connections_per_job: config.max_connections_per_job,
            heartbeat_timeout: config.heartbeat_timeout,
            ..RegistryConfig::default()
        },
    ));
    let heartbeat = ws::start_heartbeat(Arc::clone(&registry), config.heartbeat_interval);

    let addr = config.bind_addr.clone();
    let state = AppState {
        store,
        registry: Arc::clone(&registry),
        config: Arc::new(config),
    };
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&registry)))
        .await
        .context("Server error")?;

    heartbeat.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(registry: Arc<ConnectionRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown requested, closing observer connections");
    registry.shutdown_all().await;
}
