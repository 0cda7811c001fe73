//! HTTP server: routes, operator endpoints and graceful shutdown.

use std::future::{pending, Future};
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::state::AppState;
use crate::ws::{ws_handler, HubMetricsSnapshot};

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered connections.
    pub connections: usize,
    /// Channel entries.
    pub channels: usize,
}

/// Member count of one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    /// Channel identifier.
    pub channel: String,
    /// Registered connections.
    pub members: usize,
}

/// Hub statistics response.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Counters.
    pub metrics: HubMetricsSnapshot,
    /// Per-channel membership.
    pub channels: Vec<ChannelStats>,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/ws", get(ws_handler))
        .route("/v1/ws/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.hub.registry();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        connections: registry.connection_count(),
        channels: registry.channel_count(),
    })
}

/// GET /v1/ws/stats
async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let channels = state
        .hub
        .registry()
        .channels()
        .into_iter()
        .map(|(channel, members)| ChannelStats { channel, members })
        .collect();

    Json(StatsResponse {
        metrics: state.hub.metrics().snapshot(),
        channels,
    })
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install ctrl-c handler");
        pending::<()>().await;
    }
}

/// The API server.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Creates a new server.
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Builds the router for this server.
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        info!(address = %listener.local_addr()?, "listening");
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `signal` resolves, then closes every
    /// connection and waits for the workers to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let hub = Arc::clone(&self.state.hub);
        let drain_timeout = self.config.hub.shutdown_timeout();
        let router = self.router();

        let signal_hub = Arc::clone(&hub);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                signal.await;
                info!("shutdown signal received");
                signal_hub.begin_shutdown();
            })
            .await?;

        hub.begin_shutdown();
        let drained = hub.drain(drain_timeout).await;
        info!(drained, "server stopped");
        Ok(())
    }
}
