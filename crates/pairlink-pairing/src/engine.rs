//! Shortcode pairing handshake over connection channels
//!
//! The responder's pending request and the initiator's redemption may
//! be handled by different server processes; the two legs rendezvous on
//! the channel keyed by the shortcode. No pairing state is stored
//! anywhere — a pending request exists only as a cancellable task
//! racing the response against the TTL.

use pairlink_core::{
    ConnectionChannelFactory, Config, Error, Metadata, Result, Role, TokenClaims, TokenSigner,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::session::{ChannelSession, PairingEntry};

const SHORTCODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SHORTCODE_LENGTH: usize = 6;

/// Generate a 6-character uppercase alphanumeric shortcode.
pub fn generate_shortcode() -> String {
    let mut rng = rand::thread_rng();
    (0..SHORTCODE_LENGTH)
        .map(|_| SHORTCODE_ALPHABET[rng.gen_range(0..SHORTCODE_ALPHABET.len())] as char)
        .collect()
}

/// Generate a globally unique pairing id.
pub fn generate_pairing_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

type Generator = Box<dyn Fn() -> String + Send + Sync>;
type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// The terminal result of a pending pairing. Exactly one of these is
/// ever produced per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PairingOutcome {
    Paired {
        initiator_public_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
    Expired,
}

/// What the responder gets back immediately from `create_pairing_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialPairingData {
    pub pairing_id: String,
    pub shortcode: String,
    /// Absolute expiry, unix milliseconds.
    pub expiry: i64,
    /// Signed responder token bound to the pairing id.
    pub token: String,
}

/// A pairing request awaiting redemption.
pub struct PendingPairing {
    data: InitialPairingData,
    outcome: oneshot::Receiver<PairingOutcome>,
}

impl PendingPairing {
    pub fn initial_data(&self) -> &InitialPairingData {
        &self.data
    }

    pub fn pairing_id(&self) -> &str {
        &self.data.pairing_id
    }

    pub fn shortcode(&self) -> &str {
        &self.data.shortcode
    }

    /// Await the terminal outcome: paired within the TTL, or expired.
    pub async fn redemption_result(self) -> PairingOutcome {
        // The sender half lives in the handshake task; it is consumed
        // by its single send, so a second resolution cannot happen.
        self.outcome.await.unwrap_or(PairingOutcome::Expired)
    }
}

/// What the initiator gets back from a successful redemption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatorPairDetails {
    pub pairing_id: String,
    pub responder_public_key: String,
    pub initiator_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Orchestrates the shortcode handshake: issue, await, confirm, expire.
pub struct PairingEngine {
    channels: Arc<dyn ConnectionChannelFactory>,
    signer: Arc<dyn TokenSigner>,
    ttl: Duration,
    confirm_timeout: Duration,
    shortcode_generator: Generator,
    pairing_id_generator: Generator,
    clock: Clock,
}

impl PairingEngine {
    pub fn new(channels: Arc<dyn ConnectionChannelFactory>, signer: Arc<dyn TokenSigner>) -> Self {
        Self {
            channels,
            signer,
            ttl: Duration::from_millis(60_000),
            confirm_timeout: Duration::from_millis(10_000),
            shortcode_generator: Box::new(generate_shortcode),
            pairing_id_generator: Box::new(generate_pairing_id),
            clock: Box::new(now_millis),
        }
    }

    /// Builder pattern: take TTL and confirmation timeout from config
    pub fn with_config(mut self, config: &Config) -> Self {
        self.ttl = config.pairing_ttl();
        self.confirm_timeout = config.confirm_timeout();
        self
    }

    /// Builder pattern: override the shortcode generator
    pub fn with_shortcode_generator(
        mut self,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.shortcode_generator = Box::new(generator);
        self
    }

    /// Builder pattern: override the pairing id generator
    pub fn with_pairing_id_generator(
        mut self,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.pairing_id_generator = Box::new(generator);
        self
    }

    /// Builder pattern: override the millisecond clock
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Issue a shortcode and wait (concurrently) for it to be redeemed.
    ///
    /// Returns immediately with the shortcode, pairing id, expiry and
    /// signed responder token. A background task races the initiator's
    /// response against the TTL; whichever finishes first resolves the
    /// outcome exactly once and the losing branch is dropped.
    pub async fn create_pairing_request(
        &self,
        responder_public_key: &str,
        metadata: Option<Metadata>,
    ) -> Result<PendingPairing> {
        let shortcode = (self.shortcode_generator)();
        let pairing_id = (self.pairing_id_generator)();
        let expiry = (self.clock)() + self.ttl.as_millis() as i64;

        let token = self.signer.sign(&TokenClaims {
            role: Role::Responder,
            pairing_id: pairing_id.clone(),
        })?;

        let mut session = ChannelSession::open(self.channels.as_ref(), &shortcode).await?;

        let entry = PairingEntry {
            pairing_id: pairing_id.clone(),
            shortcode: shortcode.clone(),
            responder_public_key: responder_public_key.to_string(),
            metadata,
        };

        let (resolve, outcome) = oneshot::channel();
        let ttl = self.ttl;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(ttl, session.wait_for_response()).await {
                Ok(Ok((initiator_public_key, metadata))) => {
                    match session.send_confirm(&entry).await {
                        Ok(()) => PairingOutcome::Paired {
                            initiator_public_key,
                            metadata,
                        },
                        Err(e) => {
                            warn!("failed to confirm pairing {}: {}", entry.pairing_id, e);
                            PairingOutcome::Expired
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!("pairing channel failed for {}: {}", entry.pairing_id, e);
                    PairingOutcome::Expired
                }
                Err(_) => {
                    debug!("pairing {} expired unredeemed", entry.pairing_id);
                    PairingOutcome::Expired
                }
            };
            // Receiver may already be dropped; the outcome is then moot.
            let _ = resolve.send(result);
        });

        Ok(PendingPairing {
            data: InitialPairingData {
                pairing_id,
                shortcode,
                expiry,
                token,
            },
            outcome,
        })
    }

    /// Redeem a shortcode on behalf of an initiator.
    ///
    /// A confirmation timeout is indistinguishable from a shortcode
    /// that never existed, so both surface as `NotFound`.
    pub async fn respond_to_pairing_request(
        &self,
        shortcode: &str,
        initiator_public_key: &str,
        metadata: Option<Metadata>,
    ) -> Result<InitiatorPairDetails> {
        let not_found = || Error::NotFound(format!("shortcode {} does not exist", shortcode));

        let mut session = ChannelSession::open(self.channels.as_ref(), shortcode)
            .await
            .map_err(|_| not_found())?;
        session
            .send_response(initiator_public_key, metadata)
            .await
            .map_err(|_| not_found())?;

        let entry =
            match tokio::time::timeout(self.confirm_timeout, session.wait_for_confirmation()).await
            {
                Ok(Ok(entry)) => entry,
                Ok(Err(e)) => {
                    debug!("confirmation channel failed for {}: {}", shortcode, e);
                    return Err(not_found());
                }
                Err(_) => return Err(not_found()),
            };

        let initiator_token = self.signer.sign(&TokenClaims {
            role: Role::Initiator,
            pairing_id: entry.pairing_id.clone(),
        })?;

        Ok(InitiatorPairDetails {
            pairing_id: entry.pairing_id,
            responder_public_key: entry.responder_public_key,
            initiator_token,
            metadata: entry.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_core::{InMemoryChannelFactory, KeyedTokenSigner};

    fn test_engine() -> PairingEngine {
        let channels = Arc::new(InMemoryChannelFactory::new());
        let signer = Arc::new(KeyedTokenSigner::new("test-secret"));
        PairingEngine::new(channels, signer)
    }

    fn test_signer() -> KeyedTokenSigner {
        KeyedTokenSigner::new("test-secret")
    }

    #[tokio::test]
    async fn test_create_returns_shortcode_and_expiry() {
        let engine = test_engine().with_clock(|| 0);

        let pending = engine.create_pairing_request("RESP_KEY", None).await.unwrap();
        let data = pending.initial_data();

        assert_eq!(data.shortcode.len(), 6);
        assert!(data
            .shortcode
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(data.expiry, 60_000);
        assert!(!data.pairing_id.is_empty());

        let claims = test_signer().verify(&data.token).unwrap();
        assert_eq!(claims.role, Role::Responder);
        assert_eq!(claims.pairing_id, data.pairing_id);
    }

    #[tokio::test]
    async fn test_successful_handshake() {
        let engine = Arc::new(test_engine());

        let pending = engine.create_pairing_request("RESP_KEY", None).await.unwrap();
        let shortcode = pending.shortcode().to_string();
        let pairing_id = pending.pairing_id().to_string();

        let details = engine
            .respond_to_pairing_request(&shortcode, "INIT_KEY", None)
            .await
            .unwrap();

        assert_eq!(details.pairing_id, pairing_id);
        assert_eq!(details.responder_public_key, "RESP_KEY");

        let claims = test_signer().verify(&details.initiator_token).unwrap();
        assert_eq!(claims.role, Role::Initiator);
        assert_eq!(claims.pairing_id, pairing_id);

        let outcome = pending.redemption_result().await;
        assert_eq!(
            outcome,
            PairingOutcome::Paired {
                initiator_public_key: "INIT_KEY".to_string(),
                metadata: None,
            }
        );
    }

    #[tokio::test]
    async fn test_metadata_carried_both_ways() {
        let engine = Arc::new(test_engine());

        let responder_meta: Metadata = [("device".to_string(), "laptop".to_string())].into();
        let initiator_meta: Metadata = [("device".to_string(), "phone".to_string())].into();

        let pending = engine
            .create_pairing_request("RESP_KEY", Some(responder_meta.clone()))
            .await
            .unwrap();
        let shortcode = pending.shortcode().to_string();

        let details = engine
            .respond_to_pairing_request(&shortcode, "INIT_KEY", Some(initiator_meta.clone()))
            .await
            .unwrap();
        assert_eq!(details.metadata, Some(responder_meta));

        match pending.redemption_result().await {
            PairingOutcome::Paired { metadata, .. } => {
                assert_eq!(metadata, Some(initiator_meta));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unredeemed_pairing_expires() {
        let engine = test_engine();

        let pending = engine.create_pairing_request("RESP_KEY", None).await.unwrap();
        let shortcode = pending.shortcode().to_string();

        // No response arrives; the 60s TTL wins the race.
        let outcome = pending.redemption_result().await;
        assert_eq!(outcome, PairingOutcome::Expired);

        // The shortcode is gone for any later redemption attempt.
        let result = engine
            .respond_to_pairing_request(&shortcode, "INIT_KEY", None)
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_shortcode_fails_not_found() {
        let engine = test_engine();

        let result = engine
            .respond_to_pairing_request("ZZZZZZ", "INIT_KEY", None)
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_response_fails_not_found() {
        let engine = Arc::new(test_engine());

        let pending = engine.create_pairing_request("RESP_KEY", None).await.unwrap();
        let shortcode = pending.shortcode().to_string();

        engine
            .respond_to_pairing_request(&shortcode, "INIT_KEY", None)
            .await
            .unwrap();
        assert!(matches!(
            pending.redemption_result().await,
            PairingOutcome::Paired { .. }
        ));

        // The redeemed shortcode's session is not reused; a second
        // response finds nobody to confirm it.
        let second = engine
            .respond_to_pairing_request(&shortcode, "OTHER_KEY", None)
            .await;
        assert!(matches!(second, Err(Error::NotFound(_))));
    }
}
