//! Feedvault Server - Main entry point

use anyhow::{Context, Result};
use feedvault_common::logging::{init_logging, LogConfig};
use feedvault_ingest::{IngestSettings, JobStore, ProviderRegistry, Providers, S3Storage, TransformStage};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use feedvault_server::{config::Config, router, serve, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // Environment variables configure logging; only unset fields get server defaults
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if std::env::var("LOG_FILE_PREFIX").is_err() {
        log_config.log_file_prefix = "feedvault-server".to_string();
    }
    if log_config.filter_directives.is_none() {
        log_config.filter_directives = Some(
            "feedvault_server=debug,feedvault_ingest=debug,tower_http=debug,aws_smithy_runtime=warn"
                .to_string(),
        );
    }

    let _guard = init_logging(&log_config)?;

    info!("Starting Feedvault Server");
    info!("Configuration loaded - server will bind to {}", config.bind_address());

    let settings = IngestSettings::from_env().context("Invalid ingest settings")?;
    let store = S3Storage::new(settings.storage.clone())
        .await
        .context("Failed to initialize object storage")?;
    info!("Storage client initialized");

    let transform = TransformStage::from_settings(&settings);
    let work_dir = settings.work_dir.clone();
    let providers = Providers::new(ProviderRegistry::builtin(), settings, Arc::new(store));
    let jobs = JobStore::new(Arc::new(providers), transform, work_dir);
    info!(providers = ?jobs.providers(), "Provider registry ready");

    let app = router(AppState { jobs }, &config.cors);

    let addr: SocketAddr = config.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    serve(
        listener,
        app,
        shutdown_signal(),
        Duration::from_secs(config.server.shutdown_timeout_secs),
    )
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
