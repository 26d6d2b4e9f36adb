//! Registry mapping session ids to their live connection.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, info};

use super::connection::{Connection, ConnectionHandle, ConnectionId};

struct Entry {
    connection_id: ConnectionId,
    handle: Weak<Connection>,
}

/// At most one live connection per session.
///
/// The registry only brokers lookups: it holds weak references, and the
/// lifecycle handler that owns a connection is responsible for tearing it
/// down and releasing its slot.
pub struct SessionRegistry {
    /// Session ID -> current connection
    connections: DashMap<String, Entry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register `handle` for `session_id`, replacing any existing entry.
    ///
    /// Returns the replaced connection if it is still alive. It is not closed
    /// here; that is up to the caller.
    pub fn register(&self, session_id: &str, handle: &ConnectionHandle) -> Option<ConnectionHandle> {
        let entry = Entry {
            connection_id: handle.id(),
            handle: Arc::downgrade(handle),
        };
        let previous = self.connections.insert(session_id.to_string(), entry);
        info!(
            session_id = %session_id,
            connection_id = %handle.id(),
            replaced = previous.is_some(),
            "Registered connection"
        );

        previous
            .and_then(|entry| entry.handle.upgrade())
            .filter(|prev| prev.id() != handle.id())
    }

    /// Remove the entry for `session_id`, whichever connection it points to.
    ///
    /// Removing an absent session is a no-op. Returns whether an entry was removed.
    pub fn unregister(&self, session_id: &str) -> bool {
        let removed = self.connections.remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "Unregistered session");
        }
        removed
    }

    /// Remove the entry for `session_id` only if it still belongs to `connection_id`.
    ///
    /// Used on teardown so that a superseded connection cannot evict its replacement.
    pub fn release(&self, session_id: &str, connection_id: ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(session_id, |_, entry| entry.connection_id == connection_id)
            .is_some();
        if removed {
            info!(
                session_id = %session_id,
                connection_id = %connection_id,
                "Released connection"
            );
        } else {
            debug!(
                session_id = %session_id,
                connection_id = %connection_id,
                "Release skipped, session owned by another connection or absent"
            );
        }
        removed
    }

    /// Current connection for `session_id`, if any.
    pub fn lookup(&self, session_id: &str) -> Option<ConnectionHandle> {
        let handle = self
            .connections
            .get(session_id)
            .and_then(|entry| entry.handle.upgrade());

        if handle.is_none() {
            // Owner dropped without releasing; prune the stale entry.
            self.connections
                .remove_if(session_id, |_, entry| entry.handle.strong_count() == 0);
        }
        handle
    }

    /// Whether `session_id` currently has a live connection.
    pub fn contains(&self, session_id: &str) -> bool {
        self.lookup(session_id).is_some()
    }

    /// Number of sessions with a live connection.
    pub fn len(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().handle.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of sessions with a live connection, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| entry.value().handle.strong_count() > 0)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Close every live connection, e.g. on shutdown.
    ///
    /// Entries are released by the owning handlers as they observe the close.
    pub async fn close_all(&self, code: u16, reason: &str) -> usize {
        let handles: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .filter_map(|entry| entry.value().handle.upgrade())
            .collect();

        join_all(handles.iter().map(|handle| handle.close(code, reason))).await;
        if !handles.is_empty() {
            info!(count = handles.len(), "Closed all connections");
        }
        handles.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
