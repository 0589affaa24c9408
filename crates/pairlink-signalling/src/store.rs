//! Keyed registry of live signalling connections
//!
//! At most one connection may hold a `(pairing_id, role)` key at a
//! time. The store owns all synchronization: `register_connection` and
//! `remove_connection` combine mutation with the opposite-role lookup
//! as one atomic step, which is what makes the peer-notification
//! guarantees hold when both legs authenticate at nearly the same
//! instant. Every operation is async so a distributed implementation
//! (one addressable actor per key) can suspend where the in-memory one
//! never does.

use async_trait::async_trait;
use pairlink_core::{Error, Result, Role, ServerFrame};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Capability handed in by the transport adapter for one live socket.
pub trait ConnectionSink: Send + Sync {
    /// Queue a text frame. Delivery is best-effort; a send to a closing
    /// socket is dropped.
    fn send_message(&self, message: String);
    fn disconnect(&self);
}

/// One authenticated live connection.
#[derive(Clone)]
pub struct ConnectionRecord {
    /// Generated id distinguishing this connection from a later one
    /// reusing the same key.
    pub connection_id: String,
    pub pairing_id: String,
    pub role: Role,
    /// Random value chosen by the connecting party at auth time; the
    /// peer binds it into its signed content messages.
    pub nonce: String,
    pub sink: Arc<dyn ConnectionSink>,
}

impl ConnectionRecord {
    pub fn send_message(&self, message: String) {
        self.sink.send_message(message);
    }

    pub fn send_peer_connect(&self, peer_nonce: &str) {
        self.sink.send_message(
            ServerFrame::PeerConnect {
                nonce: peer_nonce.to_string(),
            }
            .to_json(),
        );
    }

    pub fn send_peer_disconnect(&self) {
        self.sink.send_message(ServerFrame::PeerDisconnect.to_json());
    }
}

impl std::fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("connection_id", &self.connection_id)
            .field("pairing_id", &self.pairing_id)
            .field("role", &self.role)
            .finish()
    }
}

/// Registry of live connections keyed by `(pairing_id, role)`.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn put_connection(&self, record: ConnectionRecord) -> Result<()>;
    async fn get_connection(&self, pairing_id: &str, role: Role)
        -> Result<Option<ConnectionRecord>>;
    async fn has_connection(&self, pairing_id: &str, role: Role) -> Result<bool>;
    async fn delete_connection(&self, pairing_id: &str, role: Role) -> Result<()>;

    /// Insert the record and look up the opposite role atomically.
    /// Fails with an auth error if the key is already held.
    async fn register_connection(
        &self,
        record: ConnectionRecord,
    ) -> Result<Option<ConnectionRecord>>;

    /// Delete the key if it is still held by `connection_id` and look
    /// up the opposite role atomically. Returns the surviving peer, or
    /// `None` when there is nobody to notify (including when the key
    /// was already released — making disconnection idempotent).
    async fn remove_connection(
        &self,
        pairing_id: &str,
        role: Role,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>>;
}

/// Single-process store: a mutex-protected map.
#[derive(Default)]
pub struct InMemoryConnectionStore {
    connections: Mutex<HashMap<(String, Role), ConnectionRecord>>,
}

impl InMemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn put_connection(&self, record: ConnectionRecord) -> Result<()> {
        let mut connections = self.connections.lock().await;
        connections.insert((record.pairing_id.clone(), record.role), record);
        Ok(())
    }

    async fn get_connection(
        &self,
        pairing_id: &str,
        role: Role,
    ) -> Result<Option<ConnectionRecord>> {
        let connections = self.connections.lock().await;
        Ok(connections.get(&(pairing_id.to_string(), role)).cloned())
    }

    async fn has_connection(&self, pairing_id: &str, role: Role) -> Result<bool> {
        let connections = self.connections.lock().await;
        Ok(connections.contains_key(&(pairing_id.to_string(), role)))
    }

    async fn delete_connection(&self, pairing_id: &str, role: Role) -> Result<()> {
        let mut connections = self.connections.lock().await;
        connections.remove(&(pairing_id.to_string(), role));
        Ok(())
    }

    async fn register_connection(
        &self,
        record: ConnectionRecord,
    ) -> Result<Option<ConnectionRecord>> {
        let mut connections = self.connections.lock().await;
        let key = (record.pairing_id.clone(), record.role);
        if connections.contains_key(&key) {
            return Err(Error::Auth(format!(
                "{} already connected for pairing {}",
                record.role, record.pairing_id
            )));
        }
        let peer_key = (record.pairing_id.clone(), record.role.opposite());
        let peer = connections.get(&peer_key).cloned();
        connections.insert(key, record);
        Ok(peer)
    }

    async fn remove_connection(
        &self,
        pairing_id: &str,
        role: Role,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>> {
        let mut connections = self.connections.lock().await;
        let key = (pairing_id.to_string(), role);
        match connections.get(&key) {
            Some(record) if record.connection_id == connection_id => {
                connections.remove(&key);
                let peer_key = (pairing_id.to_string(), role.opposite());
                Ok(connections.get(&peer_key).cloned())
            }
            _ => Ok(None),
        }
    }
}
