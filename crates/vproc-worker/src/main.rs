//! Media-transformation worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vproc_jobstore::JobStore;
use vproc_storage::BlobStore;
use vproc_worker::{
    pipeline::ProcessContext, preflight, Dispatcher, EngineConfig, RetentionSweeper,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for the AWS SDK's TLS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vproc=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vproc-worker");

    // Load configuration
    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    // Build the stores
    let store = match JobStore::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create job store: {}", e);
            std::process::exit(1);
        }
    };

    let blobs = match BlobStore::from_env().await {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to create blob store: {}", e);
            std::process::exit(1);
        }
    };

    // Environment report; problems are warnings, not fatal
    preflight::run_preflight(&config, &store).await;

    // Shutdown signal shared by both loops
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let ctx = Arc::new(ProcessContext::new(&config, store.clone(), blobs.clone()));
    let dispatcher = Dispatcher::new(ctx, config.clone(), shutdown_rx.clone());
    let sweeper = RetentionSweeper::new(store, blobs, config, shutdown_rx);

    let dispatcher_handle = tokio::spawn(dispatcher.run());
    let sweeper_handle = tokio::spawn(sweeper.run());

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    // Loops finish their in-flight work, then stop between cycles
    dispatcher_handle.await.ok();
    sweeper_handle.await.ok();

    info!("Worker shutdown complete");
}
