//! Channel membership registry.
//!
//! Maps a channel identifier (a bus ID) to the connections listening on it.
//! One mutex guards the whole mapping; critical sections only touch the maps
//! and never perform I/O. Callers that need to write to members take a
//! [`Registry::snapshot`] and iterate it after the lock is released.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::connection::{Connection, ConnectionId};

#[derive(Debug, Default)]
struct Members {
    /// Channel to members.
    channels: HashMap<String, HashMap<ConnectionId, Connection>>,
    /// Connection to the channel it is registered under.
    index: HashMap<ConnectionId, String>,
}

impl Members {
    fn remove(&mut self, channel: &str, id: ConnectionId, prune: bool) -> bool {
        let Some(set) = self.channels.get_mut(channel) else {
            return false;
        };
        if set.remove(&id).is_none() {
            return false;
        }
        if prune && set.is_empty() {
            self.channels.remove(channel);
        }
        self.index.remove(&id);
        true
    }
}

/// Lock-protected mapping from channel to live connections.
///
/// The registry records membership only. It never closes a connection;
/// that is the job of the connection's worker.
#[derive(Debug, Default)]
pub struct Registry {
    members: Mutex<Members>,
    prune_empty: bool,
}

impl Registry {
    /// Creates a registry that keeps channel entries once created.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that drops a channel entry when it empties.
    #[must_use]
    pub fn with_pruning(prune_empty: bool) -> Self {
        Self {
            members: Mutex::default(),
            prune_empty,
        }
    }

    /// Adds a connection to a channel, creating the channel if needed.
    ///
    /// Registering the same connection twice on one channel is a no-op. A
    /// connection already registered elsewhere is moved, so it is never a
    /// member of two channels.
    pub fn register(&self, channel: &str, connection: Connection) {
        let mut guard = self.members.lock();
        let members = &mut *guard;
        let id = connection.id();

        if let Some(previous) = members.index.get(&id) {
            if previous != channel {
                let previous = previous.clone();
                members.remove(&previous, id, self.prune_empty);
            }
        }

        members.index.insert(id, channel.to_string());
        members
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(id, connection);
    }

    /// Removes a connection from a channel.
    ///
    /// Returns true only for the call that actually removed it; removing an
    /// absent connection is a no-op.
    pub fn unregister(&self, channel: &str, id: ConnectionId) -> bool {
        self.members.lock().remove(channel, id, self.prune_empty)
    }

    /// Removes a batch of connections under a single lock acquisition.
    ///
    /// Returns how many were actually removed.
    pub fn unregister_many(&self, entries: &[(String, ConnectionId)]) -> usize {
        let mut members = self.members.lock();
        entries
            .iter()
            .filter(|(channel, id)| members.remove(channel, *id, self.prune_empty))
            .count()
    }

    /// Returns a point-in-time copy of a channel's members.
    #[must_use]
    pub fn snapshot(&self, channel: &str) -> Vec<Connection> {
        let members = self.members.lock();
        members
            .channels
            .get(channel)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns a point-in-time copy of every channel's members.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<(String, Vec<Connection>)> {
        let members = self.members.lock();
        members
            .channels
            .iter()
            .map(|(channel, set)| (channel.clone(), set.values().cloned().collect()))
            .collect()
    }

    /// Returns true if the connection is registered under the channel.
    #[must_use]
    pub fn contains(&self, channel: &str, id: ConnectionId) -> bool {
        let members = self.members.lock();
        members
            .channels
            .get(channel)
            .is_some_and(|set| set.contains_key(&id))
    }

    /// Returns the number of members of a channel.
    #[must_use]
    pub fn member_count(&self, channel: &str) -> usize {
        let members = self.members.lock();
        members.channels.get(channel).map_or(0, HashMap::len)
    }

    /// Returns the number of channel entries, including empty ones.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.members.lock().channels.len()
    }

    /// Returns the number of registered connections across all channels.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.members.lock().index.len()
    }

    /// Returns every channel with its member count, sorted by channel.
    #[must_use]
    pub fn channels(&self) -> Vec<(String, usize)> {
        let mut channels: Vec<(String, usize)> = {
            let members = self.members.lock();
            members
                .channels
                .iter()
                .map(|(channel, set)| (channel.clone(), set.len()))
                .collect()
        };
        channels.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        channels
    }

    /// Drops every channel entry with no members.
    ///
    /// Returns how many entries were removed.
    pub fn prune_empty(&self) -> usize {
        let mut members = self.members.lock();
        let before = members.channels.len();
        members.channels.retain(|_, set| !set.is_empty());
        before - members.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::ws::connection::Outbound;

    fn connection() -> (Connection, Outbound) {
        Connection::open(8, CancellationToken::new())
    }

    fn ids(snapshot: &[Connection]) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = snapshot.iter().map(Connection::id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_register_and_snapshot() {
        let registry = Registry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();

        registry.register("bus-1", a.clone());
        registry.register("bus-1", b.clone());

        let mut expected = vec![a.id(), b.id()];
        expected.sort_unstable();
        assert_eq!(ids(&registry.snapshot("bus-1")), expected);
        assert_eq!(registry.member_count("bus-1"), 2);
        assert!(registry.snapshot("bus-2").is_empty());
    }

    #[test]
    fn test_register_twice_is_noop() {
        let registry = Registry::new();
        let (a, _rx) = connection();

        registry.register("bus-1", a.clone());
        registry.register("bus-1", a.clone());

        assert_eq!(registry.member_count("bus-1"), 1);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_register_moves_between_channels() {
        let registry = Registry::new();
        let (a, _rx) = connection();

        registry.register("bus-1", a.clone());
        registry.register("bus-2", a.clone());

        assert!(!registry.contains("bus-1", a.id()));
        assert!(registry.contains("bus-2", a.id()));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_unregister_once() {
        let registry = Registry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();
        registry.register("bus-1", a.clone());
        registry.register("bus-1", b.clone());

        assert!(registry.unregister("bus-1", a.id()));
        assert!(!registry.unregister("bus-1", a.id()));

        assert_eq!(ids(&registry.snapshot("bus-1")), vec![b.id()]);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = Registry::new();
        let (a, _rx) = connection();

        assert!(!registry.unregister("bus-1", a.id()));

        registry.register("bus-1", a.clone());
        assert!(!registry.unregister("bus-2", a.id()));
        assert!(registry.contains("bus-1", a.id()));
    }

    #[test]
    fn test_empty_channel_retained_by_default() {
        let registry = Registry::new();
        let (a, _rx) = connection();
        registry.register("bus-1", a.clone());

        registry.unregister("bus-1", a.id());

        assert_eq!(registry.channel_count(), 1);
        assert_eq!(registry.channels(), vec![("bus-1".to_string(), 0)]);
    }

    #[test]
    fn test_empty_channel_pruned_when_enabled() {
        let registry = Registry::with_pruning(true);
        let (a, _rx) = connection();
        registry.register("bus-1", a.clone());

        registry.unregister("bus-1", a.id());

        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_prune_empty() {
        let registry = Registry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();
        registry.register("bus-1", a.clone());
        registry.register("bus-2", b.clone());
        registry.unregister("bus-1", a.id());

        assert_eq!(registry.prune_empty(), 1);
        assert_eq!(registry.channels(), vec![("bus-2".to_string(), 1)]);
    }

    #[test]
    fn test_unregister_many() {
        let registry = Registry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();
        let (c, _rx_c) = connection();
        registry.register("bus-1", a.clone());
        registry.register("bus-1", b.clone());
        registry.register("bus-2", c.clone());

        let removed = registry.unregister_many(&[
            ("bus-1".to_string(), a.id()),
            ("bus-2".to_string(), c.id()),
            ("bus-2".to_string(), c.id()),
        ]);

        assert_eq!(removed, 2);
        assert_eq!(registry.connection_count(), 1);
        assert!(registry.contains("bus-1", b.id()));
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let registry = Registry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();
        registry.register("bus-1", a.clone());

        let snapshot = registry.snapshot("bus-1");
        registry.register("bus-1", b.clone());
        registry.unregister("bus-1", a.id());

        assert_eq!(ids(&snapshot), vec![a.id()]);
    }

    #[test]
    fn test_snapshot_all() {
        let registry = Registry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();
        registry.register("bus-1", a.clone());
        registry.register("bus-2", b.clone());

        let mut all = registry.snapshot_all();
        all.sort_by(|x, y| x.0.cmp(&y.0));

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "bus-1");
        assert_eq!(ids(&all[0].1), vec![a.id()]);
        assert_eq!(all[1].0, "bus-2");
        assert_eq!(ids(&all[1].1), vec![b.id()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_no_lost_updates() {
        let registry = Arc::new(Registry::new());
        let mut handles = Vec::new();
        let mut receivers = Vec::new();

        for _ in 0..64 {
            let (conn, rx) = connection();
            receivers.push(rx);
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.register("bus-1", conn);
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        assert_eq!(registry.member_count("bus-1"), 64);
        assert_eq!(registry.snapshot("bus-1").len(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_unregister_linearizable() {
        let registry = Arc::new(Registry::new());
        let mut keep = Vec::new();
        let mut handles = Vec::new();
        let mut receivers = Vec::new();

        for i in 0..32 {
            let (conn, rx) = connection();
            receivers.push(rx);
            let channel = if i % 2 == 0 { "bus-1" } else { "bus-2" };
            let drop_it = i % 4 == 0;
            if !drop_it && channel == "bus-1" {
                keep.push(conn.id());
            }
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.register(channel, conn.clone());
                if drop_it {
                    registry.unregister(channel, conn.id());
                }
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        keep.sort_unstable();
        assert_eq!(ids(&registry.snapshot("bus-1")), keep);
        assert_eq!(registry.member_count("bus-2"), 16);
    }
}
