//! Hub metrics tracking.
//!
//! Provides atomic counters for monitoring connections and broadcasts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Metrics for the realtime hub.
#[derive(Debug)]
pub struct HubMetrics {
    /// Total connections opened.
    connections_opened: AtomicU64,

    /// Total connections closed.
    connections_closed: AtomicU64,

    /// Total inbound frames read (and discarded).
    frames_received: AtomicU64,

    /// Total frames queued for delivery by the dispatcher.
    messages_queued: AtomicU64,

    /// Total frames written to sockets.
    messages_sent: AtomicU64,

    /// Total broadcast calls that produced an encoded payload.
    broadcasts: AtomicU64,

    /// Total per-recipient delivery failures.
    delivery_failures: AtomicU64,

    /// Total broadcasts abandoned because the payload failed to encode.
    encoding_errors: AtomicU64,

    /// Total upgrade requests rejected before the handshake.
    upgrade_rejections: AtomicU64,

    /// Total failed handshakes.
    upgrade_failures: AtomicU64,

    /// Total connections removed from the registry after a failed write.
    evictions: AtomicU64,

    /// Start time for uptime.
    start_time: Instant,
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HubMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            messages_queued: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            encoding_errors: AtomicU64::new(0),
            upgrade_rejections: AtomicU64::new(0),
            upgrade_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a connection opened.
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a connection closed.
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an inbound frame.
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a frame queued for a recipient.
    pub fn record_message_queued(&self) {
        self.messages_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a frame written to a socket.
    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a broadcast.
    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed delivery.
    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an encoding failure.
    pub fn record_encoding_error(&self) {
        self.encoding_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rejected upgrade request.
    pub fn record_upgrade_rejection(&self) {
        self.upgrade_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed handshake.
    pub fn record_upgrade_failure(&self) {
        self.upgrade_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records connections evicted from the registry.
    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Returns the total connections opened.
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Returns the total connections closed.
    #[must_use]
    pub fn connections_closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }

    /// Returns the current active connections.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.connections_opened()
            .saturating_sub(self.connections_closed())
    }

    /// Returns the total inbound frames.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Returns the total frames queued.
    #[must_use]
    pub fn messages_queued(&self) -> u64 {
        self.messages_queued.load(Ordering::Relaxed)
    }

    /// Returns the total frames written.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Returns the total broadcasts.
    #[must_use]
    pub fn broadcasts(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }

    /// Returns the total delivery failures.
    #[must_use]
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Returns the total encoding failures.
    #[must_use]
    pub fn encoding_errors(&self) -> u64 {
        self.encoding_errors.load(Ordering::Relaxed)
    }

    /// Returns the total rejected upgrade requests.
    #[must_use]
    pub fn upgrade_rejections(&self) -> u64 {
        self.upgrade_rejections.load(Ordering::Relaxed)
    }

    /// Returns the total failed handshakes.
    #[must_use]
    pub fn upgrade_failures(&self) -> u64 {
        self.upgrade_failures.load(Ordering::Relaxed)
    }

    /// Returns the total evictions.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            connections_opened: self.connections_opened(),
            connections_closed: self.connections_closed(),
            active_connections: self.active_connections(),
            frames_received: self.frames_received(),
            messages_queued: self.messages_queued(),
            messages_sent: self.messages_sent(),
            broadcasts: self.broadcasts(),
            delivery_failures: self.delivery_failures(),
            encoding_errors: self.encoding_errors(),
            upgrade_rejections: self.upgrade_rejections(),
            upgrade_failures: self.upgrade_failures(),
            evictions: self.evictions(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// A point-in-time snapshot of hub metrics.
#[derive(Debug, Clone, Serialize)]
pub struct HubMetricsSnapshot {
    /// Total connections opened.
    pub connections_opened: u64,
    /// Total connections closed.
    pub connections_closed: u64,
    /// Active connections.
    pub active_connections: u64,
    /// Inbound frames.
    pub frames_received: u64,
    /// Frames queued.
    pub messages_queued: u64,
    /// Frames written.
    pub messages_sent: u64,
    /// Broadcasts.
    pub broadcasts: u64,
    /// Delivery failures.
    pub delivery_failures: u64,
    /// Encoding failures.
    pub encoding_errors: u64,
    /// Rejected upgrade requests.
    pub upgrade_rejections: u64,
    /// Failed handshakes.
    pub upgrade_failures: u64,
    /// Evictions.
    pub evictions: u64,
    /// Uptime in seconds.
    pub uptime_secs: u64,
}
