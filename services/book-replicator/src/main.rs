use std::sync::Arc;

use book_replicator::api::create_router;
use book_replicator::{BookReplicator, ReplicatorConfig};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use types::ids::ConsumerId;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ReplicatorConfig::from_env();
    tracing::info!(
        url = %config.ws_url,
        policy = ?config.sequence_policy,
        "Starting order book replicator"
    );

    let engine = Arc::new(BookReplicator::with_websocket(&config));

    let bootstrap = ConsumerId::new("bootstrap")?;
    for (symbol, depth) in &config.initial_topics {
        if let Err(e) = engine.subscribe(symbol, *depth, bootstrap.clone()) {
            tracing::warn!(symbol = %symbol, depth, error = %e, "Skipping configured topic");
        }
    }
    engine.start();

    let app = create_router(engine.clone());
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    engine.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
