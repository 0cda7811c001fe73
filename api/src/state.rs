//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use crate::config::HubConfig;
use crate::ws::Hub;

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The realtime hub.
    pub hub: Arc<Hub>,
    /// When the server started.
    pub started_at: Instant,
}

impl AppState {
    /// Creates state around an existing hub.
    #[must_use]
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            started_at: Instant::now(),
        }
    }

    /// Creates state with a fresh hub built from `config`.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        Self::new(Arc::new(Hub::new(config)))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_config(HubConfig::default())
    }
}
