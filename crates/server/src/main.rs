//! Brick Server - Main Entry Point
//!
//! Loads the configured model once, serves `llm.LLMService` and drains
//! in-flight streams on `StopServer` or Ctrl-C.

use brick_common::{BrickConfig, Result, METRICS};
use brick_server::{backend, ServerLifecycle};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = BrickConfig::load()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("brick_server={},tower=warn,h2=warn", config.observability.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Brick Server");
    info!(
        "Configuration loaded: model={}, backend={:?}, bind={}:{}",
        config.model.model_id, config.model.backend, config.bind_address, config.port
    );

    let loader = backend::loader_for(&config);
    let lifecycle = ServerLifecycle::new(config, loader);

    // Ctrl-C takes the same drain path as StopServer
    let shutdown = lifecycle.shutdown_signal();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                shutdown.trigger();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    if let Err(e) = lifecycle.serve().await {
        error!("Server failed: {}", e);
        return Err(e);
    }

    debug!("Final metrics:\n{}", METRICS.gather());
    info!("Brick Server shutdown complete");
    Ok(())
}
