//! Farebox API - realtime fare notifications.
//!
//! This crate provides the WebSocket hub that pushes fare payment outcomes
//! to the displays mounted on each bus, plus the HTTP server hosting it.
//!
//! # Components
//!
//! - [`config`]: Server and hub configuration
//! - [`error`]: Hub error types
//! - [`events`]: Fare event payloads
//! - [`server`]: HTTP server and operator endpoints
//! - [`state`]: Shared application state
//! - [`ws`]: Connection registry, dispatcher and lifecycle workers

pub mod config;
pub mod error;
pub mod events;
pub mod server;
pub mod state;
pub mod ws;

pub use config::{ConfigError, HubConfig, ServerConfig};
pub use error::HubError;
pub use events::{FareErrorKind, FareEvent, FareReceipt};
pub use server::Server;
pub use state::AppState;
pub use ws::Hub;
