//! The realtime hub service.
//!
//! One [`Hub`] is built at process start and shared as `Arc<Hub>` with the
//! upgrade handler and with every business handler that publishes events.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::connection::Connection;
use super::dispatcher::Dispatcher;
use super::metrics::HubMetrics;
use super::registry::Registry;
use super::worker::LifecycleWorker;
use crate::config::HubConfig;

/// Connection registry, broadcast dispatcher and worker supervisor.
#[derive(Debug)]
pub struct Hub {
    config: HubConfig,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    metrics: Arc<HubMetrics>,
    shutdown: CancellationToken,
    workers: TaskTracker,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    /// Creates a hub with the given settings.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let registry = Arc::new(Registry::with_pruning(config.prune_empty_channels));
        let metrics = Arc::new(HubMetrics::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&metrics));

        Self {
            config,
            registry,
            dispatcher,
            metrics,
            shutdown: CancellationToken::new(),
            workers: TaskTracker::new(),
        }
    }

    /// Returns the membership registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }

    /// Sends `message` to every connection on `channel`. Best-effort.
    pub fn broadcast_to_channel<T>(&self, channel: &str, message: &T)
    where
        T: Serialize + ?Sized,
    {
        self.dispatcher.broadcast_to_channel(channel, message);
    }

    /// Sends `message` to every connection on every channel. Best-effort.
    pub fn broadcast_all<T>(&self, message: &T)
    where
        T: Serialize + ?Sized,
    {
        self.dispatcher.broadcast_all(message);
    }

    /// Registers a new connection under `channel` and returns its worker.
    ///
    /// The connection is a registry member before the worker reads a single
    /// frame, so no broadcast issued after this call can miss it.
    #[must_use]
    pub fn open_connection(&self, channel: &str) -> LifecycleWorker {
        let (connection, outbound) =
            Connection::open(self.config.outbound_buffer, self.shutdown.child_token());
        self.registry.register(channel, connection.clone());
        self.metrics.record_connection_opened();

        LifecycleWorker::new(
            channel.to_string(),
            connection,
            outbound,
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            self.shutdown.clone(),
            &self.config,
        )
    }

    /// Takes ownership of an upgraded socket and supervises it.
    pub fn accept(&self, channel: String, socket: WebSocket) {
        let worker = self.open_connection(&channel);
        info!(channel = %channel, connection_id = worker.connection().id(), "connection accepted");

        let (sink, stream) = socket.split();
        self.workers.spawn(async move {
            worker.run(sink, stream).await;
        });
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Returns the number of running connection workers.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Signals every worker to close. Idempotent.
    pub fn begin_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(workers = self.workers.len(), "hub shutting down");
        }
        self.shutdown.cancel();
        self.workers.close();
    }

    /// Waits up to `timeout` for every running worker to finish.
    ///
    /// Returns false if some workers were still running at the deadline.
    pub async fn drain(&self, timeout: Duration) -> bool {
        // Without this, wait() never resolves on a tracker that is still open.
        self.workers.close();
        let drained = tokio::time::timeout(timeout, self.workers.wait())
            .await
            .is_ok();
        if !drained {
            warn!(
                workers = self.workers.len(),
                "hub drain timed out, some connections may still be open"
            );
        }
        drained
    }

    /// Signals every worker to close and waits for them.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.begin_shutdown();
        self.drain(timeout).await
    }
}
