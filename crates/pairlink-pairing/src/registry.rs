//! Store-based pairing variant
//!
//! Synchronous in-process deployments keep a pending pairing as a
//! stored entry instead of a live handshake task; the responder polls
//! `check_pairing_status` for the result. The entry is consumed by the
//! first status read after redemption — a second read fails `NotFound`.

use pairlink_core::{Error, Metadata, Result, Role, TokenClaims, TokenSigner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::engine::{generate_pairing_id, generate_shortcode, InitialPairingData};

type Generator = Box<dyn Fn() -> String + Send + Sync>;
type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// One pending or redeemed pairing request.
#[derive(Debug, Clone)]
struct PairingRecord {
    pairing_id: String,
    shortcode: String,
    expiry: i64,
    responder_public_key: String,
    responder_metadata: Option<Metadata>,
    redeemed: bool,
    initiator_public_key: Option<String>,
    initiator_metadata: Option<Metadata>,
}

impl PairingRecord {
    fn is_expired(&self, now: i64) -> bool {
        self.expiry <= now
    }
}

/// Result of a status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PairingStatus {
    Awaiting,
    Paired {
        initiator_public_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
}

#[derive(Default)]
struct Entries {
    by_pairing_id: HashMap<String, PairingRecord>,
    shortcode_index: HashMap<String, String>,
}

impl Entries {
    fn insert(&mut self, record: PairingRecord) {
        self.shortcode_index
            .insert(record.shortcode.clone(), record.pairing_id.clone());
        self.by_pairing_id.insert(record.pairing_id.clone(), record);
    }

    fn remove(&mut self, pairing_id: &str) {
        if let Some(record) = self.by_pairing_id.remove(pairing_id) {
            self.shortcode_index.remove(&record.shortcode);
        }
    }

    fn sweep_expired(&mut self, now: i64) {
        let expired: Vec<String> = self
            .by_pairing_id
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.pairing_id.clone())
            .collect();
        for pairing_id in expired {
            self.remove(&pairing_id);
        }
    }
}

/// Keyed pairing registry: the store-backed implementation of the
/// pairing contract.
pub struct PairingRegistry {
    entries: RwLock<Entries>,
    signer: Arc<dyn TokenSigner>,
    ttl_ms: i64,
    shortcode_generator: Generator,
    pairing_id_generator: Generator,
    clock: Clock,
}

impl PairingRegistry {
    pub fn new(signer: Arc<dyn TokenSigner>) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            signer,
            ttl_ms: 60_000,
            shortcode_generator: Box::new(generate_shortcode),
            pairing_id_generator: Box::new(generate_pairing_id),
            clock: Box::new(|| chrono::Utc::now().timestamp_millis()),
        }
    }

    /// Builder pattern: set the TTL in milliseconds
    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
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

    /// Register a responder's interest and issue its shortcode + token.
    pub async fn create_pairing_request(
        &self,
        responder_public_key: &str,
        metadata: Option<Metadata>,
    ) -> Result<InitialPairingData> {
        let shortcode = (self.shortcode_generator)();
        let pairing_id = (self.pairing_id_generator)();
        let now = (self.clock)();
        let expiry = now + self.ttl_ms;

        let token = self.signer.sign(&TokenClaims {
            role: Role::Responder,
            pairing_id: pairing_id.clone(),
        })?;

        let mut entries = self.entries.write().await;
        entries.sweep_expired(now);
        entries.insert(PairingRecord {
            pairing_id: pairing_id.clone(),
            shortcode: shortcode.clone(),
            expiry,
            responder_public_key: responder_public_key.to_string(),
            responder_metadata: metadata,
            redeemed: false,
            initiator_public_key: None,
            initiator_metadata: None,
        });

        info!("created pairing request {}", pairing_id);

        Ok(InitialPairingData {
            pairing_id,
            shortcode,
            expiry,
            token,
        })
    }

    /// Redeem a shortcode. Valid only once and only before expiry.
    pub async fn respond_to_pairing_request(
        &self,
        shortcode: &str,
        initiator_public_key: &str,
        metadata: Option<Metadata>,
    ) -> Result<crate::engine::InitiatorPairDetails> {
        let now = (self.clock)();
        let mut entries = self.entries.write().await;

        let pairing_id = entries.shortcode_index.get(shortcode).cloned();
        let record = pairing_id.and_then(|id| entries.by_pairing_id.get_mut(&id));

        let record = match record {
            Some(r) if !r.redeemed && !r.is_expired(now) => r,
            _ => {
                return Err(Error::NotFound(format!(
                    "shortcode {} does not exist",
                    shortcode
                )))
            }
        };

        record.redeemed = true;
        record.initiator_public_key = Some(initiator_public_key.to_string());
        record.initiator_metadata = metadata;

        let pairing_id = record.pairing_id.clone();
        let responder_public_key = record.responder_public_key.clone();
        let responder_metadata = record.responder_metadata.clone();

        let initiator_token = self.signer.sign(&TokenClaims {
            role: Role::Initiator,
            pairing_id: pairing_id.clone(),
        })?;

        info!("pairing {} redeemed", pairing_id);

        Ok(crate::engine::InitiatorPairDetails {
            pairing_id,
            responder_public_key,
            initiator_token,
            metadata: responder_metadata,
        })
    }

    /// Poll a pairing's status. A redeemed entry is consumed by the
    /// read that observes it.
    pub async fn check_pairing_status(&self, pairing_id: &str) -> Result<PairingStatus> {
        let now = (self.clock)();
        let mut entries = self.entries.write().await;

        let record = match entries.by_pairing_id.get(pairing_id) {
            Some(r) if !r.is_expired(now) => r,
            _ => {
                return Err(Error::NotFound(format!(
                    "pairing id {} does not exist",
                    pairing_id
                )))
            }
        };

        if !record.redeemed {
            return Ok(PairingStatus::Awaiting);
        }

        let status = PairingStatus::Paired {
            initiator_public_key: record.initiator_public_key.clone().unwrap_or_default(),
            metadata: record.initiator_metadata.clone(),
        };
        entries.remove(pairing_id);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_core::KeyedTokenSigner;

    fn fixed_registry() -> PairingRegistry {
        PairingRegistry::new(Arc::new(KeyedTokenSigner::new("test-secret")))
            .with_shortcode_generator(|| "ABC123".to_string())
            .with_pairing_id_generator(|| "p1".to_string())
            .with_clock(|| 0)
    }

    #[tokio::test]
    async fn test_full_lifecycle_scenario() {
        let registry = fixed_registry();
        let signer = KeyedTokenSigner::new("test-secret");

        let data = registry.create_pairing_request("RESP_KEY", None).await.unwrap();
        assert_eq!(data.shortcode, "ABC123");
        assert_eq!(data.pairing_id, "p1");
        assert_eq!(data.expiry, 60_000);

        let status = registry.check_pairing_status("p1").await.unwrap();
        assert_eq!(status, PairingStatus::Awaiting);

        let details = registry
            .respond_to_pairing_request("ABC123", "INIT_KEY", None)
            .await
            .unwrap();
        assert_eq!(details.pairing_id, "p1");
        assert_eq!(details.responder_public_key, "RESP_KEY");
        let claims = signer.verify(&details.initiator_token).unwrap();
        assert_eq!(claims.role, Role::Initiator);
        assert_eq!(claims.pairing_id, "p1");

        let status = registry.check_pairing_status("p1").await.unwrap();
        assert_eq!(
            status,
            PairingStatus::Paired {
                initiator_public_key: "INIT_KEY".to_string(),
                metadata: None,
            }
        );

        // One-time read: the entry is consumed.
        let result = registry.check_pairing_status("p1").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_shortcode_redeemable_only_once() {
        let registry = fixed_registry();

        registry.create_pairing_request("RESP_KEY", None).await.unwrap();
        registry
            .respond_to_pairing_request("ABC123", "INIT_KEY", None)
            .await
            .unwrap();

        let second = registry
            .respond_to_pairing_request("ABC123", "OTHER_KEY", None)
            .await;
        assert!(matches!(second, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_entry_not_redeemable() {
        let signer: Arc<dyn TokenSigner> = Arc::new(KeyedTokenSigner::new("test-secret"));
        let now = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let now_clone = now.clone();
        let registry = PairingRegistry::new(signer)
            .with_shortcode_generator(|| "ABC123".to_string())
            .with_clock(move || now_clone.load(std::sync::atomic::Ordering::SeqCst));

        let data = registry.create_pairing_request("RESP_KEY", None).await.unwrap();

        now.store(60_000, std::sync::atomic::Ordering::SeqCst);

        let result = registry
            .respond_to_pairing_request("ABC123", "INIT_KEY", None)
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let status = registry.check_pairing_status(&data.pairing_id).await;
        assert!(matches!(status, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_ids_fail_not_found() {
        let registry = fixed_registry();

        assert!(matches!(
            registry.check_pairing_status("missing").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            registry
                .respond_to_pairing_request("ZZZZZZ", "INIT_KEY", None)
                .await,
            Err(Error::NotFound(_))
        ));
    }
}
