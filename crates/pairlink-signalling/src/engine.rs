//! Per-connection signalling state machine
//!
//! Each inbound connection gets its own [`ConnectionHandler`] running
//! `Unauthenticated → Authenticated → Disconnected`. All state shared
//! between connections lives behind the [`ConnectionStore`], so
//! handlers never lock each other.

use pairlink_core::{Error, Result, Role};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::AuthValidator;
use crate::store::{ConnectionRecord, ConnectionSink, ConnectionStore};

/// Shared entry point: constructs a handler per inbound connection.
#[derive(Clone)]
pub struct SignallingEngine {
    store: Arc<dyn ConnectionStore>,
    validator: Arc<dyn AuthValidator>,
}

impl SignallingEngine {
    pub fn new(store: Arc<dyn ConnectionStore>, validator: Arc<dyn AuthValidator>) -> Self {
        Self { store, validator }
    }

    /// Bookkeeping for a newly accepted connection. No network effect.
    pub fn on_connection(&self, sink: Arc<dyn ConnectionSink>) -> ConnectionHandler {
        ConnectionHandler {
            store: self.store.clone(),
            validator: self.validator.clone(),
            connection_id: Uuid::new_v4().to_string(),
            sink,
            state: HandlerState::Unauthenticated,
        }
    }
}

enum HandlerState {
    Unauthenticated,
    Authenticated {
        pairing_id: String,
        role: Role,
    },
    Disconnected,
}

/// State machine for a single signalling connection.
pub struct ConnectionHandler {
    store: Arc<dyn ConnectionStore>,
    validator: Arc<dyn AuthValidator>,
    connection_id: String,
    sink: Arc<dyn ConnectionSink>,
    state: HandlerState,
}

impl ConnectionHandler {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Authenticate this connection and register it under
    /// `(pairing_id, role)`.
    ///
    /// If the opposite role is already registered, both sides receive
    /// exactly one `peerConnect` carrying the *other's* nonce — the
    /// atomic register step guarantees only the second joiner of a pair
    /// triggers the exchange, whatever the arrival order.
    pub async fn on_auth_message(&mut self, token: &str, nonce: String) -> Result<()> {
        if !matches!(self.state, HandlerState::Unauthenticated) {
            return Err(Error::Auth(
                "auth message on already-authed connection".to_string(),
            ));
        }

        let parsed = self.validator.validate_token(token)?;
        let record = ConnectionRecord {
            connection_id: self.connection_id.clone(),
            pairing_id: parsed.pairing_id.clone(),
            role: parsed.role,
            nonce: nonce.clone(),
            sink: self.sink.clone(),
        };

        let peer = self.store.register_connection(record).await?;
        self.state = HandlerState::Authenticated {
            pairing_id: parsed.pairing_id.clone(),
            role: parsed.role,
        };
        info!(
            "connection authenticated as {} for pairing {}",
            parsed.role, parsed.pairing_id
        );

        if let Some(peer) = peer {
            // Each side learns only the other's nonce.
            self.sink.send_message(
                pairlink_core::ServerFrame::PeerConnect {
                    nonce: peer.nonce.clone(),
                }
                .to_json(),
            );
            peer.send_peer_connect(&nonce);
        }

        Ok(())
    }

    /// Relay a content frame to the peer, verbatim. A missing peer is a
    /// silent drop, not an error.
    pub async fn on_content_message(&self, raw: String) -> Result<()> {
        let (pairing_id, role) = match &self.state {
            HandlerState::Authenticated { pairing_id, role } => (pairing_id.clone(), *role),
            _ => {
                return Err(Error::Auth(
                    "content message received before auth".to_string(),
                ))
            }
        };

        match self.store.get_connection(&pairing_id, role.opposite()).await? {
            Some(peer) => peer.send_message(raw),
            None => debug!("no peer for pairing {}; dropping message", pairing_id),
        }
        Ok(())
    }

    /// Release this connection's registration and notify the surviving
    /// peer, if any. Safe to call more than once.
    pub async fn on_disconnection(&mut self) -> Result<()> {
        if let HandlerState::Authenticated { pairing_id, role } =
            std::mem::replace(&mut self.state, HandlerState::Disconnected)
        {
            if let Some(peer) = self
                .store
                .remove_connection(&pairing_id, role, &self.connection_id)
                .await?
            {
                peer.send_peer_disconnect();
            }
            info!("{} disconnected from pairing {}", role, pairing_id);
        }
        Ok(())
    }
}
