//! Live-connection registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::Notify;

use super::connection::{Connection, ConnectionId};

/// Tracks every connection between accept and cleanup.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    accepted: AtomicU64,
    emptied: Notify,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection.
    pub fn insert(&self, connection: Arc<Connection>) {
        let _ = self.accepted.fetch_add(1, Ordering::Relaxed);
        let _ = self.connections.write().insert(connection.id(), connection);
    }

    /// Deregister a connection. Returns it if it was present.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write();
        let removed = connections.remove(id);
        if connections.is_empty() {
            self.emptied.notify_waiters();
        }
        removed
    }

    /// Look up a live connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Connections accepted since start.
    pub fn accepted_total(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Snapshot of live connections.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Resolve once no connection is registered.
    pub async fn wait_empty(&self) {
        loop {
            let notified = self.emptied.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}
