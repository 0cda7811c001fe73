//! Connection handles.
//!
//! A [`Connection`] is the cheap, cloneable side of a live WebSocket that
//! the registry and dispatcher see. The socket itself is owned by the
//! connection's lifecycle worker; the handle only queues outbound frames and
//! can ask the worker to close.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, WriteFailure};

/// Unique identifier of a connection within the process.
pub type ConnectionId = u64;

/// Global connection ID counter.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique connection ID.
#[must_use]
pub fn next_connection_id() -> ConnectionId {
    CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Receiving end of a connection's outbound queue, drained by its worker.
pub type Outbound = mpsc::Receiver<Utf8Bytes>;

/// Handle to a live connection.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<Utf8Bytes>,
    close: CancellationToken,
}

impl Connection {
    /// Opens a new handle with an outbound queue of `capacity` frames.
    ///
    /// `close` is cancelled when the connection should shut down; pass a
    /// child of the hub's shutdown token so shutdown reaches every worker.
    #[must_use]
    pub fn open(capacity: usize, close: CancellationToken) -> (Self, Outbound) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: next_connection_id(),
            sender,
            close,
        };
        (connection, receiver)
    }

    /// Returns the connection ID.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues an encoded frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Write`] if the queue is full or the worker has
    /// stopped draining it.
    pub fn try_send(&self, payload: Utf8Bytes) -> Result<(), HubError> {
        self.sender.try_send(payload).map_err(|err| HubError::Write {
            connection_id: self.id,
            reason: match err {
                TrySendError::Full(_) => WriteFailure::QueueFull,
                TrySendError::Closed(_) => WriteFailure::Closed,
            },
        })
    }

    /// Asks the owning worker to close the connection.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Returns true once the connection is closing or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled() || self.sender.is_closed()
    }

    /// Completes when [`Connection::close`] is called or the hub shuts down.
    pub async fn closed(&self) {
        self.close.cancelled().await;
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}
