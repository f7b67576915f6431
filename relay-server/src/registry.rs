//! Session registry.
//!
//! Maps a session id to the connection currently bound to it. Bindings are
//! last-writer-wins: registering a second connection under the same id
//! silently replaces the first. Delivery through [`SessionRegistry::send`] is
//! best-effort and at-most-once; messages for unbound sessions are dropped.

use crate::message::ServerMessage;
use dashmap::DashMap;
use relay_common::logging::generate_connection_id;
use tokio::sync::mpsc;

/// Outbound side of one client connection.
///
/// Cloning yields another sender for the same connection. The connection's
/// writer task finishes once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: String,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a message for the connection. Returns false if the writer is gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Live session bindings.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: DashMap<String, ConnectionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a freshly accepted connection as open and awaiting its session info.
    ///
    /// No binding is created until [`register`](Self::register).
    pub fn initialize(&self, tx: mpsc::UnboundedSender<ServerMessage>) -> ConnectionHandle {
        let handle = ConnectionHandle {
            id: generate_connection_id(),
            tx,
        };
        tracing::info!(connection_id = %handle.id, "Connection opened, awaiting session info");
        handle
    }

    /// Bind `session_id` to `handle`, returning the binding it replaced.
    pub fn register(&self, session_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let connection_id = handle.id.clone();
        let previous = self.connections.insert(session_id.to_string(), handle);

        match &previous {
            Some(old) if old.id != connection_id => tracing::warn!(
                session_id = %session_id,
                connection_id = %connection_id,
                replaced = %old.id,
                "Session re-registered, previous connection replaced"
            ),
            _ => tracing::info!(
                session_id = %session_id,
                connection_id = %connection_id,
                "Connected"
            ),
        }

        previous
    }

    /// Remove the binding for `session_id`. No-op if absent.
    pub fn unregister(&self, session_id: &str) -> bool {
        let removed = self.connections.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id = %session_id, "Disconnected");
        }
        removed
    }

    /// Remove the binding only if it still belongs to `connection_id`.
    ///
    /// A connection that was replaced must not evict its replacement.
    pub fn release(&self, session_id: &str, connection_id: &str) -> bool {
        let removed = self
            .connections
            .remove_if(session_id, |_, handle| handle.id == connection_id)
            .is_some();
        if removed {
            tracing::info!(
                session_id = %session_id,
                connection_id = %connection_id,
                "Disconnected"
            );
        }
        removed
    }

    /// Deliver to the connection bound to `session_id`, if any.
    ///
    /// Returns whether the message was handed to a connection.
    pub fn send(&self, session_id: &str, message: ServerMessage) -> bool {
        let handle = match self.connections.get(session_id) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::debug!(session_id = %session_id, "Dropping message for unbound session");
                return false;
            }
        };
        handle.send(message)
    }

    pub fn is_live(&self, session_id: &str) -> bool {
        self.connections.contains_key(session_id)
    }

    /// Connection id currently bound to `session_id`.
    pub fn connection_id(&self, session_id: &str) -> Option<String> {
        self.connections
            .get(session_id)
            .map(|entry| entry.value().id.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
