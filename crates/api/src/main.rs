//! Herald API server binary entrypoint.
//!
//! Serves the producer API and, unless disabled, runs the outbox worker
//! in the same process.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_common::db::connect_and_migrate;
use herald_notifier::dispatcher::FallbackDispatcher;
use herald_notifier::provider::providers_from_config;
use herald_notifier::store::PgOutboxStore;
use herald_notifier::worker::{OutboxWorker, WorkerConfig};

use herald_api::routes::create_router;
use herald_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("herald_api=info,herald_notifier=info,tower_http=info")
        }))
        .init();

    tracing::info!("Starting Herald API server...");

    let config = AppConfig::from_env()?;
    let pool = connect_and_migrate(&config.database_url, config.db_max_connections).await?;

    let cancel = CancellationToken::new();
    let worker = if config.outbox_worker_enabled {
        let store = PgOutboxStore::new(pool.clone()).with_claim_lease(config.outbox_claim_lease());
        Some(spawn_worker(&config, store, cancel.clone())?)
    } else {
        tracing::warn!("Outbox worker disabled; items will only be enqueued");
        None
    };

    let app = create_router(AppState::new(pool))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.api_bind_addr).await?;
    tracing::info!(addr = %config.api_bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(handle) = worker {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Outbox worker task failed");
        }
    }

    tracing::info!("Herald API server stopped");
    Ok(())
}

fn spawn_worker(
    config: &AppConfig,
    store: PgOutboxStore,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let (primary, secondary) = providers_from_config(config)?;
    let dispatcher = FallbackDispatcher::new(primary, secondary, config.provider_timeout());
    let worker = OutboxWorker::new(
        Arc::new(store),
        dispatcher,
        WorkerConfig::from_app_config(config)?,
    );

    Ok(tokio::spawn(async move { worker.run(cancel).await }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
