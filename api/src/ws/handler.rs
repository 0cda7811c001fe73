//! WebSocket upgrade handler.
//!
//! `GET /v1/ws?id=<bus id>` upgrades the request and registers the new
//! connection under that bus's channel.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::warn;

use crate::error::HubError;
use crate::state::AppState;

/// Query parameters of the upgrade endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsParams {
    /// Channel to join.
    pub id: Option<String>,
}

/// Returns the channel to join, rejecting missing or blank identifiers.
///
/// # Errors
///
/// Returns [`HubError::MissingChannel`] if `id` is absent or blank.
pub fn resolve_channel(params: WsParams) -> Result<String, HubError> {
    match params.id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(HubError::MissingChannel),
    }
}

/// WebSocket upgrade handler.
///
/// The channel is checked before the handshake so a request without one is
/// rejected without touching the transport.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, HubError> {
    let hub = Arc::clone(&state.hub);

    let channel = resolve_channel(params).inspect_err(|err| {
        warn!(error = %err, "rejecting websocket request");
        hub.metrics().record_upgrade_rejection();
    })?;

    if hub.is_shutting_down() {
        hub.metrics().record_upgrade_rejection();
        return Err(HubError::ShuttingDown);
    }

    let upgrade = upgrade.map_err(|rejection| {
        let err = HubError::Upgrade(rejection);
        warn!(channel = %channel, error = %err, "websocket handshake rejected");
        hub.metrics().record_upgrade_failure();
        err
    })?;

    let metrics = Arc::clone(hub.metrics());
    let failed_channel = channel.clone();

    Ok(upgrade
        .on_failed_upgrade(move |err| {
            warn!(channel = %failed_channel, error = %err, "websocket upgrade failed");
            metrics.record_upgrade_failure();
        })
        .on_upgrade(move |socket| async move {
            hub.accept(channel, socket);
        }))
}
