mod api;
mod blob_store;
mod config;
mod error;
mod image_ingest;
mod materializer;
mod model;
mod store;
mod upsert;

use anyhow::{Context, Result};
use api::{start_api_server, AppState};
use blob_store::{ObjectStore, S3BlobStore};
use config::Config;
use image_ingest::ImageIngestor;
use materializer::CatalogMaterializer;
use std::sync::Arc;
use store::{PgVariantStore, VariantStore};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use upsert::UpsertEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Missing credentials or bucket names must fail here, never per-request
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting catalog service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let pg_store = PgVariantStore::new(&config.database)
        .await
        .context("Failed to initialize variant store")?;

    // Run migrations if enabled
    if config.database.run_migrations {
        pg_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let db_pool = pg_store.pool().clone();
    let variant_store: Arc<dyn VariantStore> = Arc::new(pg_store);

    let blob_store: Arc<dyn ObjectStore> = Arc::new(
        S3BlobStore::new(&config.s3, config.signed_url_expiry())
            .await
            .context("Failed to initialize S3 blob store")?,
    );

    let engine = Arc::new(UpsertEngine::new(variant_store.clone()));
    let materializer = Arc::new(CatalogMaterializer::new(
        variant_store.clone(),
        blob_store.clone(),
    ));
    let ingestor = Arc::new(ImageIngestor::new(blob_store.clone(), config.image.clone()));

    // Create API state
    let api_state = AppState {
        engine,
        materializer,
        ingestor,
        db_pool,
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Catalog service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down catalog service");

    api_handle.abort();

    info!("Catalog service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
