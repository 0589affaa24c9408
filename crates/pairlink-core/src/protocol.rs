//! Signalling wire protocol message types
//!
//! Frames are JSON text over a persistent connection. Content frames
//! (`offer`, `answer`, `iceCandidate`) are relayed verbatim and never
//! re-encoded by the relay, so only their discriminator is modelled
//! here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque string→string map carried end to end with a pairing.
pub type Metadata = HashMap<String, String>;

/// Server-to-client control frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// The peer for this pairing is now connected. Carries the *peer's*
    /// nonce, which this party must bind into its signed messages.
    PeerConnect { nonce: String },
    /// The peer for this pairing disconnected.
    PeerDisconnect,
}

impl ServerFrame {
    pub fn to_json(&self) -> String {
        // The two variants above cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Payload of an `auth` frame once its `data` field is decoded.
///
/// The nonce-carrying transport sends `{"token":...,"nonce":...}`; the
/// pairing variant sends a bare token string and carries no nonce.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPayload {
    pub token: String,
    pub nonce: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_frame_wire_format() {
        let frame = ServerFrame::PeerConnect {
            nonce: "n1".to_string(),
        };
        assert_eq!(frame.to_json(), r#"{"type":"peerConnect","nonce":"n1"}"#);

        assert_eq!(
            ServerFrame::PeerDisconnect.to_json(),
            r#"{"type":"peerDisconnect"}"#
        );
    }
}
