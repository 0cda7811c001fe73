//! Per-connection lifecycle worker.
//!
//! Each registered connection is driven by one worker that owns the socket.
//! The worker reads (and discards) inbound frames, writes frames queued by
//! the dispatcher, and sends liveness pings. On peer close, read or write
//! error, idle timeout, eviction or shutdown it closes the transport and
//! then removes the connection from the registry.

use std::fmt;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{Connection, Outbound};
use super::metrics::HubMetrics;
use super::registry::Registry;
use crate::config::HubConfig;

/// Why a connection left the `OPEN` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame or ended the stream.
    PeerClosed,
    /// Reading from the socket failed.
    ReadError,
    /// Writing to the socket failed.
    WriteError,
    /// A socket write did not finish in time.
    WriteTimeout,
    /// Nothing was received within the idle window.
    IdleTimeout,
    /// The dispatcher gave up on the connection.
    Evicted,
    /// The hub is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Close frame to send to the peer, if the peer is still reachable.
    fn close_frame(self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            Self::PeerClosed | Self::ReadError | Self::WriteError | Self::WriteTimeout => {
                return None;
            }
            Self::IdleTimeout => (close_code::AWAY, "idle timeout"),
            Self::Evicted => (close_code::POLICY, "slow consumer"),
            Self::Shutdown => (close_code::AWAY, "server shutting down"),
        };
        Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        })
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PeerClosed => "peer closed",
            Self::ReadError => "read error",
            Self::WriteError => "write error",
            Self::WriteTimeout => "write timeout",
            Self::IdleTimeout => "idle timeout",
            Self::Evicted => "evicted",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Drives one registered connection until it closes.
#[derive(Debug)]
pub struct LifecycleWorker {
    channel: String,
    connection: Connection,
    outbound: Outbound,
    registry: Arc<Registry>,
    metrics: Arc<HubMetrics>,
    shutdown: CancellationToken,
    write_timeout: Duration,
    idle_timeout: Option<Duration>,
    ping_interval: Option<Duration>,
}

impl LifecycleWorker {
    /// Creates a worker for a connection that is already registered.
    #[must_use]
    pub fn new(
        channel: String,
        connection: Connection,
        outbound: Outbound,
        registry: Arc<Registry>,
        metrics: Arc<HubMetrics>,
        shutdown: CancellationToken,
        config: &HubConfig,
    ) -> Self {
        Self {
            channel,
            connection,
            outbound,
            registry,
            metrics,
            shutdown,
            write_timeout: config.write_timeout(),
            idle_timeout: config.idle_timeout(),
            ping_interval: config.ping_interval(),
        }
    }

    /// Returns the connection this worker owns.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Runs the connection to completion and returns why it closed.
    pub async fn run<Si, St, E>(mut self, mut sink: Si, mut stream: St) -> CloseReason
    where
        Si: Sink<Message> + Unpin,
        Si::Error: fmt::Display,
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        let connection_id = self.connection.id();
        debug!(channel = %self.channel, connection_id, "connection open");

        let mut deadline = self.idle_timeout.map(|idle| Instant::now() + idle);
        let mut ping = self.ping_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let reason = loop {
            tokio::select! {
                () = self.connection.closed() => {
                    break if self.shutdown.is_cancelled() {
                        CloseReason::Shutdown
                    } else {
                        CloseReason::Evicted
                    };
                }
                queued = self.outbound.recv() => {
                    let Some(payload) = queued else {
                        break CloseReason::Evicted;
                    };
                    if let Err(reason) = write(&mut sink, Message::Text(payload), self.write_timeout).await {
                        break reason;
                    }
                    self.metrics.record_message_sent();
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Close(_))) | None => break CloseReason::PeerClosed,
                    Some(Ok(_)) => {
                        self.metrics.record_frame_received();
                        deadline = self.idle_timeout.map(|idle| Instant::now() + idle);
                    }
                    Some(Err(err)) => {
                        debug!(channel = %self.channel, connection_id, error = %err, "read failed");
                        break CloseReason::ReadError;
                    }
                },
                () = idle_expired(deadline) => break CloseReason::IdleTimeout,
                () = next_tick(&mut ping) => {
                    if let Err(reason) = write(&mut sink, Message::Ping(Default::default()), self.write_timeout).await {
                        break reason;
                    }
                }
            }
        };

        // Transport first, then membership.
        if let Some(frame) = reason.close_frame() {
            let _ = write(&mut sink, Message::Close(Some(frame)), self.write_timeout).await;
        }
        let _ = time::timeout(self.write_timeout, sink.close()).await;

        self.connection.close();
        let removed = self.registry.unregister(&self.channel, connection_id);
        self.metrics.record_connection_closed();

        info!(
            channel = %self.channel,
            connection_id,
            %reason,
            removed,
            "connection closed"
        );
        reason
    }
}

async fn write<Si>(sink: &mut Si, frame: Message, limit: Duration) -> Result<(), CloseReason>
where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    match time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            warn!(error = %err, "socket write failed");
            Err(CloseReason::WriteError)
        }
        Err(_) => Err(CloseReason::WriteTimeout),
    }
}

async fn idle_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}
