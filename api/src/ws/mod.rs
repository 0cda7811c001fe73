//! Realtime hub for fare notifications.
//!
//! Bus displays connect to `GET /v1/ws?id=<bus id>` and are registered under
//! that bus's channel. Business handlers publish events through
//! [`Hub::broadcast_to_channel`] or [`Hub::broadcast_all`]; the hub encodes
//! each message once and fans it out best-effort.
//!
//! # Components
//!
//! - [`registry`]: channel membership under one lock
//! - [`dispatcher`]: encode-once fan-out with eviction of failed recipients
//! - [`worker`]: per-connection read/write loop and liveness
//! - [`handler`]: the upgrade endpoint
//! - [`hub`]: the service object tying them together

pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod hub;
pub mod metrics;
pub mod registry;
pub mod worker;

pub use connection::{next_connection_id, Connection, ConnectionId, Outbound};
pub use dispatcher::Dispatcher;
pub use handler::{resolve_channel, ws_handler, WsParams};
pub use hub::Hub;
pub use metrics::{HubMetrics, HubMetricsSnapshot};
pub use registry::Registry;
pub use worker::{CloseReason, LifecycleWorker};
