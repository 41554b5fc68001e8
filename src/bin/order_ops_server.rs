//! # Order Ops Server
//!
//! Loads `config/order-ops.yaml`, connects the Postgres store when a database
//! URL is configured (in-memory store otherwise), starts the auto-resolution
//! worker and serves the HTTP API until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use order_ops::config::{ConfigManager, OrderOpsConfig};
use order_ops::database::{InMemoryStore, OrderStore, PgStore};
use order_ops::logging::init_structured_logging;
use order_ops::messaging::TaskQueue;
use order_ops::orchestration::OrderOpsSystem;
use order_ops::web::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = manager.config().clone();
    info!(
        environment = %manager.environment(),
        config_file = ?manager.config_file(),
        "Starting order ops server"
    );

    if config.database.url.is_some() {
        let store = PgStore::connect(&config.database)
            .await
            .context("failed to connect to Postgres")?;
        if config.database.run_migrations {
            store.run_migrations().await.context("migrations failed")?;
        }
        run(config, store).await
    } else {
        warn!("No database URL configured; using the in-memory store");
        run(config, InMemoryStore::new()).await
    }
}

async fn run<S: OrderStore + TaskQueue>(config: OrderOpsConfig, store: S) -> anyhow::Result<()> {
    let bind_address = config.server.bind_address.clone();
    let system = Arc::new(OrderOpsSystem::new(config, store));
    let worker = system.start_worker();

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    let router = web::router(AppState::new(Arc::clone(&system)));
    web::serve(listener, router, shutdown_signal())
        .await
        .context("server error")?;

    if let Some(worker) = worker {
        worker.stop().await;
    }
    info!("Order ops server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Could not listen for Ctrl-C; shutting down");
    }
    info!("Shutdown signal received");
}
