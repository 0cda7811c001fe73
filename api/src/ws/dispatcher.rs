//! Broadcast dispatcher.
//!
//! Encodes a message once and fans it out to the members of one channel or
//! of every channel. Delivery is best-effort: nothing is reported back to
//! the caller, and a recipient that cannot be written to is closed and
//! removed from the registry without affecting the others.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::connection::{Connection, ConnectionId};
use super::metrics::HubMetrics;
use super::registry::Registry;
use crate::error::HubError;

/// Fans encoded messages out to registered connections.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    metrics: Arc<HubMetrics>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>, metrics: Arc<HubMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Sends `message` to every connection registered under `channel`.
    pub fn broadcast_to_channel<T>(&self, channel: &str, message: &T)
    where
        T: Serialize + ?Sized,
    {
        let Some(payload) = self.encode(message) else {
            return;
        };

        let recipients = self.registry.snapshot(channel);
        debug!(channel, recipients = recipients.len(), "broadcast to channel");

        let failed = self.deliver(channel, &recipients, &payload);
        self.evict(&failed);
    }

    /// Sends `message` to every registered connection on every channel.
    pub fn broadcast_all<T>(&self, message: &T)
    where
        T: Serialize + ?Sized,
    {
        let Some(payload) = self.encode(message) else {
            return;
        };

        // All member lists are copied under the lock; writes happen after it
        // is released and evictions re-take it once at the end.
        let snapshot = self.registry.snapshot_all();
        let recipients: usize = snapshot.iter().map(|(_, members)| members.len()).sum();
        debug!(channels = snapshot.len(), recipients, "broadcast to all");

        let failed: Vec<(String, ConnectionId)> = snapshot
            .iter()
            .flat_map(|(channel, members)| self.deliver(channel, members, &payload))
            .collect();
        self.evict(&failed);
    }

    fn encode<T>(&self, message: &T) -> Option<Utf8Bytes>
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_string(message) {
            Ok(json) => {
                self.metrics.record_broadcast();
                Some(Utf8Bytes::from(json))
            }
            Err(e) => {
                let err = HubError::from(e);
                error!(error = %err, "broadcast abandoned");
                self.metrics.record_encoding_error();
                None
            }
        }
    }

    /// Queues `payload` on each recipient; returns the ones that failed.
    fn deliver(
        &self,
        channel: &str,
        recipients: &[Connection],
        payload: &Utf8Bytes,
    ) -> Vec<(String, ConnectionId)> {
        recipients
            .iter()
            .filter_map(|connection| match connection.try_send(payload.clone()) {
                Ok(()) => {
                    self.metrics.record_message_queued();
                    None
                }
                Err(err) => {
                    warn!(channel, connection_id = connection.id(), error = %err, "dropping recipient");
                    self.metrics.record_delivery_failure();
                    connection.close();
                    Some((channel.to_string(), connection.id()))
                }
            })
            .collect()
    }

    fn evict(&self, failed: &[(String, ConnectionId)]) {
        if failed.is_empty() {
            return;
        }
        let removed = self.registry.unregister_many(failed);
        self.metrics.record_evictions(removed);
        debug!(evicted = removed, "evicted failed recipients");
    }
}
