//! `shopmig-worker` -- media post-processing daemon.
//!
//! Downloads the media files queued by migration runs. See
//! [`WorkerConfig::from_env`] for the environment variables.

use std::sync::Arc;

use anyhow::Context;
use shopmig_core::media::{MediaFileProcessor, MediaFileProcessorRegistry, ProcessMediaHandler};
use shopmig_db::store::PgRunStore;
use shopmig_worker::config::WorkerConfig;
use shopmig_worker::download::HttpMediaDownloader;
use shopmig_worker::poller::MediaPoller;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopmig_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        media_dir = %config.media_dir.display(),
        chunk_size = config.chunk_size,
        file_chunk_bytes = config.file_chunk_bytes,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = shopmig_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    shopmig_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    shopmig_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Media processing ---
    let downloader =
        HttpMediaDownloader::new(pool.clone(), config.media_dir.clone(), config.http_timeout)?;
    let processors: Vec<Arc<dyn MediaFileProcessor>> = vec![Arc::new(downloader)];
    let registry = Arc::new(MediaFileProcessorRegistry::new(processors));
    let handler = Arc::new(ProcessMediaHandler::new(
        Arc::new(PgRunStore::new(pool.clone())),
        registry,
    ));
    let poller = MediaPoller::new(pool, handler, &config);

    let cancel = CancellationToken::new();
    let poller_cancel = cancel.clone();
    let poller_handle = tokio::spawn(async move { poller.run(poller_cancel).await });

    shutdown_signal().await;
    cancel.cancel();
    poller_handle.await.context("Media poller task panicked")?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
