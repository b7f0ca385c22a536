//! Registry of live connections.
//!
//! A connection is present from the moment the accept loop registers it until
//! its finalization removes it. Map shard locks are held only while the map is
//! mutated or snapshotted; callbacks, stops and any I/O run on a snapshot
//! outside the locks.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::connection::{Connection, ConnectionId};

/// Lookup failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    /// No live connection has this id.
    #[error("connection {0} not found")]
    NotFound(ConnectionId),
}

/// Concurrent map of [`ConnectionId`] to live [`Connection`].
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionManager {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `conn`, replacing any entry with the same id.
    pub fn add(&self, conn: Arc<Connection>) {
        let id = conn.id();
        self.connections.insert(id, conn);
        tracing::debug!(conn_id = %id, total = self.connections.len(), "connection registered");
    }

    /// Deregister `id`. Removing an absent id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(&id).map(|(_, conn)| conn);
        if removed.is_some() {
            tracing::debug!(conn_id = %id, total = self.connections.len(), "connection deregistered");
        }
        removed
    }

    /// Look up a live connection.
    ///
    /// # Errors
    /// Returns [`ManagerError::NotFound`] if `id` is not registered.
    pub fn get(&self, id: ConnectionId) -> Result<Arc<Connection>, ManagerError> {
        self.connections
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ManagerError::NotFound(id))
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize { self.connections.len() }

    /// `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.connections.is_empty() }

    /// Ids of every registered connection, in no particular order.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Point-in-time copy of every registered connection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Remove every connection, then stop each one.
    pub fn clear(&self) {
        let removed: Vec<Arc<Connection>> = self
            .connection_ids()
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect();
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "clearing connections");
        }
        for conn in removed {
            conn.stop();
        }
    }

    /// Call `f` for every registered connection.
    ///
    /// All connections are visited even if some calls fail.
    ///
    /// # Errors
    /// Returns the first error produced by `f`.
    pub fn range<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&Arc<Connection>) -> Result<(), E>,
    {
        let mut first_err = None;
        for conn in self.snapshot() {
            if let Err(err) = f(&conn)
                && first_err.is_none()
            {
                first_err = Some(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("len", &self.len())
            .finish()
    }
}
