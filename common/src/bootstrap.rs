// Bootstrap utilities for wiring settings into a ready store

use crate::config::{Settings, StoreBackend};
use crate::db::{DbPool, MemoryStore, PgStore, Store};
use crate::telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Initialize database pool
///
/// # Errors
/// Returns error if database pool initialization fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;

    if settings.store.run_migrations {
        db_pool
            .run_migrations()
            .await
            .context("Failed to apply database migrations")?;
    }

    info!("Database pool initialized");
    Ok(db_pool)
}

/// Build the store selected by `settings.store.backend`
///
/// # Errors
/// Returns error if the settings are invalid or the database is unreachable
#[tracing::instrument(skip(settings), fields(backend = ?settings.store.backend))]
pub async fn init_store(settings: &Settings) -> Result<Arc<dyn Store>> {
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let store: Arc<dyn Store> = match settings.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Postgres => Arc::new(PgStore::new(init_database_pool(settings).await?)),
    };

    store
        .health_check()
        .await
        .context("Store health check failed")?;

    info!("Store initialized");
    Ok(store)
}

/// Initialize logging and, when configured, the metrics exporter
///
/// # Errors
/// Returns error if a subscriber is already installed or the exporter cannot bind
pub fn init_observability(settings: &Settings) -> Result<()> {
    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    Ok(())
}

/// Close the store and flush pending trace spans
#[tracing::instrument(skip(store))]
pub async fn shutdown(store: &Arc<dyn Store>) {
    info!("Shutting down");
    store.close().await;
    telemetry::shutdown_tracer();
}
