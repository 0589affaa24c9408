//! Wire envelope decoding
//!
//! Splits inbound frames into auth and content. Content frames are
//! returned as the raw text they arrived as — the relay never
//! re-encodes what it forwards.

use pairlink_core::{AuthPayload, Error, Result};
use serde::Deserialize;
use serde_json::Value;

const CONTENT_TYPES: [&str; 3] = ["offer", "answer", "iceCandidate"];

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Auth(AuthPayload),
    /// An `offer`/`answer`/`iceCandidate` frame, kept verbatim.
    Content(String),
}

#[derive(Debug, Deserialize)]
struct AuthData {
    token: String,
    nonce: String,
}

/// Decode one wire frame.
pub fn parse_message(raw: &str) -> Result<IncomingMessage> {
    let json: Value =
        serde_json::from_str(raw).map_err(|_| Error::Validation("invalid JSON".to_string()))?;

    let message_type = json
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("missing type".to_string()))?;

    match message_type {
        "auth" => {
            let data = json
                .get("data")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Validation("auth message missing data".to_string()))?;
            parse_auth_data(data).map(IncomingMessage::Auth)
        }
        t if CONTENT_TYPES.contains(&t) => Ok(IncomingMessage::Content(raw.to_string())),
        t => Err(Error::Validation(format!("unknown type: {}", t))),
    }
}

/// The nonce-carrying transport sends `{"token":...,"nonce":...}`; the
/// pairing variant sends the token alone. Any other JSON object is
/// malformed.
fn parse_auth_data(data: &str) -> Result<AuthPayload> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(_)) => {
            let auth: AuthData = serde_json::from_str(data)
                .map_err(|_| Error::Validation("invalid auth message".to_string()))?;
            Ok(AuthPayload {
                token: auth.token,
                nonce: Some(auth.nonce),
            })
        }
        _ => Ok(AuthPayload {
            token: data.to_string(),
            nonce: None,
        }),
    }
}
