use crate::error::Error;
use async_trait::async_trait;
use dashmap::DashMap;
use events::BroadcastEvent;
use std::sync::Arc;

/// Unique identifier for a viewer registration (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// The write half of a live viewer's byte-stream connection.
///
/// Only the broadcast loop ever calls `send`, so implementations never see
/// concurrent writes.
#[async_trait]
pub trait ViewerConnection: Send + Sync {
    async fn send(&self, event: &BroadcastEvent) -> Result<(), Error>;

    async fn close(&self);
}

/// Set of live viewer connections.
///
/// Supports concurrent register/unregister/iterate from any number of sessions
/// and the broadcast loop.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<dyn ViewerConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection - O(1)
    pub fn register(&self, connection: Arc<dyn ViewerConnection>) -> ConnectionId {
        let connection_id = ConnectionId::new();
        self.connections.insert(connection_id.clone(), connection);
        connection_id
    }

    /// Unregister a connection - O(1). Returns the handle if it was still registered.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Arc<dyn ViewerConnection>> {
        self.connections
            .remove(connection_id)
            .map(|(_, connection)| connection)
    }

    /// Copies out the current members so no shard lock is held while writing.
    pub fn snapshot(&self) -> Vec<(ConnectionId, Arc<dyn ViewerConnection>)> {
        self.connections
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
