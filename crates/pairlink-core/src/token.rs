//! Pairing roles and the token sign/verify capability
//!
//! Tokens are opaque signed strings carrying exactly two claims: the
//! connection role and the pairing id. The signature scheme itself is a
//! pluggable capability; engines only ever call `sign` and `verify`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// The two legs of a pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// The peer's role for the same pairing.
    pub fn opposite(&self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The claims bound into every issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub role: Role,
    pub pairing_id: String,
}

/// Sign/verify capability for pairing tokens.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &TokenClaims) -> Result<String>;
    fn verify(&self, token: &str) -> Result<TokenClaims>;
}

/// Keyed-hash token signer: `base64(claims) + "." + base64(sha256(secret.payload))`.
///
/// Tamper-evident for any holder without the secret. Deployments that
/// need asymmetric verification can substitute their own `TokenSigner`.
pub struct KeyedTokenSigner {
    secret: Vec<u8>,
}

impl KeyedTokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Create a signer with a random secret. Tokens will not verify
    /// across process restarts.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let secret: [u8; 32] = rng.gen();
        Self {
            secret: secret.to_vec(),
        }
    }

    fn signature_for(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(b".");
        hasher.update(payload.as_bytes());
        BASE64.encode(hasher.finalize())
    }
}

impl TokenSigner for KeyedTokenSigner {
    fn sign(&self, claims: &TokenClaims) -> Result<String> {
        let payload = BASE64.encode(serde_json::to_vec(claims)?);
        let signature = self.signature_for(&payload);
        Ok(format!("{}.{}", payload, signature))
    }

    fn verify(&self, token: &str) -> Result<TokenClaims> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| Error::Auth("malformed token".to_string()))?;

        if self.signature_for(payload) != signature {
            return Err(Error::Auth("token signature mismatch".to_string()));
        }

        let bytes = BASE64
            .decode(payload)
            .map_err(|_| Error::Auth("malformed token payload".to_string()))?;
        serde_json::from_slice(&bytes).map_err(|_| Error::Auth("malformed token claims".to_string()))
    }
}

/// Generate a random per-connection nonce.
pub fn generate_nonce() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    BASE64.encode(bytes)
}
