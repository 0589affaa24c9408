//! Typed pairing vocabulary over a ConnectionChannel
//!
//! The handshake uses exactly two message kinds on the shortcode
//! channel: the initiator's `response` and the responder's `confirm`.
//! A session subscribes before anything is sent, so no message can be
//! missed between opening and waiting.

use pairlink_core::{
    ConnectionChannel, ConnectionChannelFactory, Error, Metadata, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Pairing details the responder confirms back to the initiator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingEntry {
    pub pairing_id: String,
    pub shortcode: String,
    pub responder_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ChannelMessage {
    Response {
        initiator_public_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
    Confirm {
        entry: PairingEntry,
    },
}

/// One party's view of a shortcode channel.
pub struct ChannelSession {
    channel: Arc<dyn ConnectionChannel>,
    rx: broadcast::Receiver<String>,
}

impl ChannelSession {
    /// Open (or look up) the channel for a shortcode and subscribe.
    pub async fn open(factory: &dyn ConnectionChannelFactory, channel_id: &str) -> Result<Self> {
        let channel = factory.get_connection_channel(channel_id).await?;
        let rx = channel.subscribe();
        Ok(Self { channel, rx })
    }

    /// Initiator: announce interest in redeeming the shortcode.
    pub async fn send_response(
        &self,
        initiator_public_key: &str,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        self.send(&ChannelMessage::Response {
            initiator_public_key: initiator_public_key.to_string(),
            metadata,
        })
        .await
    }

    /// Responder: confirm the pairing with its full details.
    pub async fn send_confirm(&self, entry: &PairingEntry) -> Result<()> {
        self.send(&ChannelMessage::Confirm {
            entry: entry.clone(),
        })
        .await
    }

    /// Responder: wait for an initiator's response.
    pub async fn wait_for_response(&mut self) -> Result<(String, Option<Metadata>)> {
        loop {
            match self.recv().await? {
                ChannelMessage::Response {
                    initiator_public_key,
                    metadata,
                } => return Ok((initiator_public_key, metadata)),
                other => debug!("skipping channel message: {:?}", other),
            }
        }
    }

    /// Initiator: wait for the responder's confirmation. The session's
    /// own echoed `response` is skipped here.
    pub async fn wait_for_confirmation(&mut self) -> Result<PairingEntry> {
        loop {
            match self.recv().await? {
                ChannelMessage::Confirm { entry } => return Ok(entry),
                other => debug!("skipping channel message: {:?}", other),
            }
        }
    }

    async fn send(&self, message: &ChannelMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.channel.send_message(json).await
    }

    async fn recv(&mut self) -> Result<ChannelMessage> {
        loop {
            match self.rx.recv().await {
                Ok(raw) => match serde_json::from_str(&raw) {
                    Ok(message) => return Ok(message),
                    // Foreign traffic on the channel is not ours to fail on.
                    Err(_) => debug!("ignoring unparseable channel message"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("channel listener lagged {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::Channel("channel closed".to_string()));
                }
            }
        }
    }
}
