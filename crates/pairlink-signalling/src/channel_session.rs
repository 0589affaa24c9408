//! Channel-backed signalling for stateless worker deployments
//!
//! When the two legs of a pairing terminate on different server
//! processes, there is no shared [`ConnectionStore`] map to meet in.
//! Instead each connection joins the broadcast channel keyed by its
//! pairing id and speaks the small role-tagged vocabulary below; a
//! session drops messages tagged with its own role so it never reacts
//! to its own echoes.
//!
//! [`ConnectionStore`]: crate::store::ConnectionStore

use pairlink_core::{
    ConnectionChannel, ConnectionChannelFactory, Error, Result, Role, ServerFrame,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::AuthValidator;
use crate::store::ConnectionSink;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum SignalMessage {
    PeerConnect { role: Role, nonce: String },
    Message { role: Role, payload: String },
    PeerDisconnect { role: Role },
}

impl SignalMessage {
    fn role(&self) -> Role {
        match self {
            SignalMessage::PeerConnect { role, .. } => *role,
            SignalMessage::Message { role, .. } => *role,
            SignalMessage::PeerDisconnect { role } => *role,
        }
    }
}

/// Something the peer did on the shared channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Connect { nonce: String },
    Message { payload: String },
    Disconnect,
}

/// One leg's view of the pairing channel.
#[derive(Clone)]
pub struct SignallingChannelSession {
    channel: Arc<dyn ConnectionChannel>,
    role: Role,
}

impl SignallingChannelSession {
    pub async fn open(
        factory: &dyn ConnectionChannelFactory,
        pairing_id: &str,
        role: Role,
    ) -> Result<Self> {
        let channel = factory.get_connection_channel(pairing_id).await?;
        Ok(Self { channel, role })
    }

    /// Subscribe to the peer's events. Subscribe before announcing, or
    /// the peer's reply can be missed.
    pub fn events(&self) -> SignalEvents {
        SignalEvents {
            rx: self.channel.subscribe(),
            role: self.role,
        }
    }

    pub async fn send_peer_connect(&self, nonce: &str) -> Result<()> {
        self.send(&SignalMessage::PeerConnect {
            role: self.role,
            nonce: nonce.to_string(),
        })
        .await
    }

    pub async fn send_content(&self, payload: String) -> Result<()> {
        self.send(&SignalMessage::Message {
            role: self.role,
            payload,
        })
        .await
    }

    pub async fn send_peer_disconnect(&self) -> Result<()> {
        self.send(&SignalMessage::PeerDisconnect { role: self.role })
            .await
    }

    async fn send(&self, message: &SignalMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.channel.send_message(json).await
    }
}

/// Stream of peer events, own echoes filtered out.
pub struct SignalEvents {
    rx: broadcast::Receiver<String>,
    role: Role,
}

impl SignalEvents {
    /// The next event from the opposite role, or `None` once the
    /// channel closes.
    pub async fn next(&mut self) -> Option<PeerEvent> {
        loop {
            let raw = match self.rx.recv().await {
                Ok(raw) => raw,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("signal listener lagged {} messages", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };

            let message: SignalMessage = match serde_json::from_str(&raw) {
                Ok(m) => m,
                Err(_) => {
                    debug!("ignoring unparseable signal message");
                    continue;
                }
            };

            if message.role() == self.role {
                continue;
            }

            return Some(match message {
                SignalMessage::PeerConnect { nonce, .. } => PeerEvent::Connect { nonce },
                SignalMessage::Message { payload, .. } => PeerEvent::Message { payload },
                SignalMessage::PeerDisconnect { .. } => PeerEvent::Disconnect,
            });
        }
    }
}

enum ChannelHandlerState {
    Unauthenticated,
    Authenticated {
        session: SignallingChannelSession,
        listener: JoinHandle<()>,
    },
    Disconnected,
}

/// Channel-backed counterpart of [`ConnectionHandler`]: same
/// `Unauthenticated → Authenticated → Disconnected` machine, but peers
/// are reached through the pairing channel instead of a shared store.
///
/// [`ConnectionHandler`]: crate::engine::ConnectionHandler
pub struct ChannelConnectionHandler {
    channels: Arc<dyn ConnectionChannelFactory>,
    validator: Arc<dyn AuthValidator>,
    sink: Arc<dyn ConnectionSink>,
    state: ChannelHandlerState,
}

impl ChannelConnectionHandler {
    pub fn new(
        channels: Arc<dyn ConnectionChannelFactory>,
        validator: Arc<dyn AuthValidator>,
        sink: Arc<dyn ConnectionSink>,
    ) -> Self {
        Self {
            channels,
            validator,
            sink,
            state: ChannelHandlerState::Unauthenticated,
        }
    }

    pub async fn on_auth_message(&mut self, token: &str, nonce: String) -> Result<()> {
        if !matches!(self.state, ChannelHandlerState::Unauthenticated) {
            return Err(Error::Auth(
                "auth message on already-authed connection".to_string(),
            ));
        }

        let parsed = self.validator.validate_token(token)?;
        let session =
            SignallingChannelSession::open(self.channels.as_ref(), &parsed.pairing_id, parsed.role)
                .await?;

        let mut events = session.events();
        let reply_session = session.clone();
        let sink = self.sink.clone();
        let own_nonce = nonce.clone();
        let listener = tokio::spawn(async move {
            let mut peer_connected = false;
            while let Some(event) = events.next().await {
                match event {
                    PeerEvent::Connect { nonce: remote } => {
                        // A connect while already paired is the peer
                        // re-announcing; only the first one counts.
                        if !peer_connected {
                            peer_connected = true;
                            // Announce back so a peer that joined after
                            // our announcement still learns our nonce.
                            if let Err(e) = reply_session.send_peer_connect(&own_nonce).await {
                                warn!("failed to answer peer connect: {}", e);
                            }
                            sink.send_message(ServerFrame::PeerConnect { nonce: remote }.to_json());
                        }
                    }
                    PeerEvent::Message { payload } => sink.send_message(payload),
                    PeerEvent::Disconnect => {
                        peer_connected = false;
                        sink.send_message(ServerFrame::PeerDisconnect.to_json());
                    }
                }
            }
        });

        session.send_peer_connect(&nonce).await?;
        self.state = ChannelHandlerState::Authenticated { session, listener };
        Ok(())
    }

    pub async fn on_content_message(&self, payload: String) -> Result<()> {
        match &self.state {
            ChannelHandlerState::Authenticated { session, .. } => {
                session.send_content(payload).await
            }
            _ => Err(Error::Auth(
                "content message received before auth".to_string(),
            )),
        }
    }

    pub async fn on_disconnection(&mut self) -> Result<()> {
        if let ChannelHandlerState::Authenticated { session, listener } =
            std::mem::replace(&mut self.state, ChannelHandlerState::Disconnected)
        {
            if let Err(e) = session.send_peer_disconnect().await {
                warn!("failed to announce disconnect: {}", e);
            }
            listener.abort();
        }
        Ok(())
    }
}
