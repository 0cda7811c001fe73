//! Farebox API server binary.
//!
//! Entry point for the realtime notification server.

use farebox_api::{AppState, Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,farebox_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env()?;
    let state = AppState::with_config(config.hub.clone());

    tracing::info!(
        "Starting Farebox API server on {}:{}",
        config.host,
        config.port
    );

    let server = Server::new(config, state);
    server.run().await?;

    Ok(())
}
