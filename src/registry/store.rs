//! Connection registry implementation
//!
//! The single shared mutable structure of the relay: every live connection,
//! keyed by id. Rooms are never stored; they are filters over this map.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::config::RegistryConfig;
use super::entry::Connection;
use super::error::RegistryError;
use super::frame::{ConnectionId, RoomId};

/// Registry of all live connections
///
/// Thread-safe via `RwLock`. Mutations take the write lock, iteration holds
/// the read lock for its whole pass, so a pass never sees a half-applied
/// mutation and a `remove` that has returned excludes the connection from
/// every later pass.
pub struct ConnectionRegistry {
    /// Map of connection id to connection handle
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,

    /// Configuration
    config: RegistryConfig,
}

impl ConnectionRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a connection under its id
    ///
    /// Ids are unique by construction, so a duplicate is a caller bug. The
    /// existing entry is kept and the new one rejected.
    pub async fn add(&self, connection: Arc<Connection>) -> Result<(), RegistryError> {
        let mut connections = self.connections.write().await;
        let id = connection.id();

        if connections.contains_key(&id) {
            tracing::error!(conn_id = %id, "Duplicate connection id rejected");
            return Err(RegistryError::DuplicateConnection(id));
        }

        tracing::debug!(
            conn_id = %id,
            room = %connection.room(),
            total = connections.len() + 1,
            "Connection registered"
        );
        connections.insert(id, connection);

        Ok(())
    }

    /// Remove a connection by id
    ///
    /// Idempotent: returns `None` when nothing was registered under `id`. The
    /// removed connection's close latch is set before the write lock is
    /// released.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;

        let removed = connections.remove(&id)?;
        removed.close();

        tracing::debug!(
            conn_id = %id,
            room = %removed.room(),
            total = connections.len(),
            "Connection unregistered"
        );

        Some(removed)
    }

    /// Apply `action` to every registered connection matching `predicate`
    ///
    /// Runs under the read lock: concurrent `add`/`remove` wait for the pass
    /// to finish. Connections whose close latch is already set are skipped.
    /// `action` must not block; it runs while the lock is held.
    ///
    /// Returns the number of connections the action was applied to.
    pub async fn for_each_matching<P, A>(&self, predicate: P, mut action: A) -> usize
    where
        P: Fn(&Connection) -> bool,
        A: FnMut(&Arc<Connection>),
    {
        let connections = self.connections.read().await;
        let mut matched = 0;

        for connection in connections.values() {
            if connection.is_closed() || !predicate(connection) {
                continue;
            }
            matched += 1;
            action(connection);
        }

        matched
    }

    /// Look up a connection by id
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&id).cloned()
    }

    /// Check if a connection is registered
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Get total number of live connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Check if no connections are registered
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Snapshot of the members of a room
    pub async fn room_members(&self, room: &RoomId) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.room() == room)
            .cloned()
            .collect()
    }

    /// Number of members in a room
    pub async fn room_size(&self, room: &RoomId) -> usize {
        let connections = self.connections.read().await;
        connections.values().filter(|c| c.room() == room).count()
    }

    /// Distinct rooms that currently have at least one member
    pub async fn rooms(&self) -> Vec<RoomId> {
        let connections = self.connections.read().await;
        let rooms: BTreeSet<&RoomId> = connections.values().map(|c| c.room()).collect();
        rooms.into_iter().cloned().collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::frame::RelayFrame;

    fn make_connection(id: u64, room: &str) -> (Arc<Connection>, mpsc::Receiver<RelayFrame>) {
        let (conn, rx) = Connection::new(
            ConnectionId::new(id),
            RoomId::new(room).unwrap(),
            None,
            16,
        );
        (Arc::new(conn), rx)
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection(1, "lobby");

        registry.add(conn).await.unwrap();
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(ConnectionId::new(1)).await);

        let removed = registry.remove(ConnectionId::new(1)).await.unwrap();
        assert!(removed.is_closed());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection(1, "lobby");
        registry.add(conn).await.unwrap();

        assert!(registry.remove(ConnectionId::new(1)).await.is_some());
        assert!(registry.remove(ConnectionId::new(1)).await.is_none());
        assert!(registry.remove(ConnectionId::new(99)).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_add_keeps_existing() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = make_connection(1, "lobby");
        let (second, _rx2) = make_connection(1, "hall");

        registry.add(first).await.unwrap();
        let result = registry.add(second).await;
        assert_eq!(
            result,
            Err(RegistryError::DuplicateConnection(ConnectionId::new(1)))
        );

        let kept = registry.get(ConnectionId::new(1)).await.unwrap();
        assert_eq!(kept.room().as_str(), "lobby");
    }

    #[tokio::test]
    async fn test_for_each_matching_filters() {
        let registry = ConnectionRegistry::new();
        for (id, room) in [(1, "lobby"), (2, "lobby"), (3, "hall")] {
            let (conn, _rx) = make_connection(id, room);
            registry.add(conn).await.unwrap();
        }

        let lobby = RoomId::new("lobby").unwrap();
        let mut seen = Vec::new();
        let matched = registry
            .for_each_matching(|c| c.room() == &lobby, |c| seen.push(c.id().get()))
            .await;

        seen.sort_unstable();
        assert_eq!(matched, 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_for_each_matching_skips_closed() {
        let registry = ConnectionRegistry::new();
        let (open, _rx1) = make_connection(1, "lobby");
        let (closing, _rx2) = make_connection(2, "lobby");
        registry.add(open).await.unwrap();
        registry.add(Arc::clone(&closing)).await.unwrap();

        // Latch set but not yet removed, as during teardown
        closing.close();

        let matched = registry.for_each_matching(|_| true, |_| {}).await;
        assert_eq!(matched, 1);
    }

    #[tokio::test]
    async fn test_rooms_are_derived() {
        let registry = ConnectionRegistry::new();
        let (a, _rx1) = make_connection(1, "lobby");
        let (b, _rx2) = make_connection(2, "lobby");
        let (c, _rx3) = make_connection(3, "hall");
        registry.add(a).await.unwrap();
        registry.add(b).await.unwrap();
        registry.add(c).await.unwrap();

        let rooms: Vec<String> = registry
            .rooms()
            .await
            .into_iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(rooms, vec!["hall", "lobby"]);

        let lobby = RoomId::new("lobby").unwrap();
        assert_eq!(registry.room_size(&lobby).await, 2);
        assert_eq!(registry.room_members(&lobby).await.len(), 2);

        // Last member leaving makes the room vanish
        registry.remove(ConnectionId::new(3)).await;
        let rooms = registry.rooms().await;
        assert_eq!(rooms, vec![lobby]);
    }

    #[tokio::test]
    async fn test_concurrent_add_remove_iterate() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();

        for id in 0..64u64 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (conn, _rx) = make_connection(id, "lobby");
                registry.add(conn).await.unwrap();
                registry.for_each_matching(|_| true, |_| {}).await;
                if id % 2 == 0 {
                    registry.remove(ConnectionId::new(id)).await;
                    registry.remove(ConnectionId::new(id)).await;
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.len().await, 32);
        let matched = registry.for_each_matching(|_| true, |_| {}).await;
        assert_eq!(matched, 32);
    }
}
