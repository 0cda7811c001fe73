//! Error types for the realtime hub.
//!
//! Every failure is handled at the layer where it occurs. Only the upgrade
//! path turns an error into an HTTP response; broadcast and connection
//! errors are logged and never reach the caller that triggered them.

use std::fmt;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::ws::ConnectionId;

/// Why a write to a single connection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    /// The outbound queue is full (the peer is not draining it).
    QueueFull,
    /// The connection's writer has already gone away.
    Closed,
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "outbound queue full"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

/// Hub errors.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The upgrade request carried no usable channel identifier.
    #[error("missing required query parameter: id")]
    MissingChannel,

    /// The hub is shutting down and no longer accepts connections.
    #[error("hub is shutting down")]
    ShuttingDown,

    /// The WebSocket handshake could not be performed.
    #[error("websocket upgrade failed: {0}")]
    Upgrade(WebSocketUpgradeRejection),

    /// A broadcast payload could not be serialized.
    #[error("failed to encode message: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A write to one recipient failed.
    #[error("write to connection {connection_id} failed: {reason}")]
    Write {
        /// Connection that could not be written to.
        connection_id: ConnectionId,
        /// Failure cause.
        reason: WriteFailure,
    },
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingChannel => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            Self::ShuttingDown => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
            }
            Self::Upgrade(rejection) => rejection.into_response(),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
        }
    }
}
