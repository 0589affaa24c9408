//! Bearer-token validation for signalling connections

use pairlink_core::{Error, Result, Role, TokenSigner};
use serde::Deserialize;
use std::sync::Arc;

/// The claims a connection authenticates with. Token lifetime is the
/// signer's concern; a token that verifies is a token that admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    pub pairing_id: String,
    pub role: Role,
}

/// Verifies an opaque bearer token and extracts its claims.
pub trait AuthValidator: Send + Sync {
    fn validate_token(&self, token: &str) -> Result<ParsedToken>;
}

/// Trusts caller-supplied JSON claims. For tests and closed deployments
/// where the transport itself is authenticated.
pub struct PassThroughAuthValidator;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClaims {
    pairing_id: String,
    role: Role,
}

impl AuthValidator for PassThroughAuthValidator {
    fn validate_token(&self, token: &str) -> Result<ParsedToken> {
        let claims: RawClaims = serde_json::from_str(token)
            .map_err(|_| Error::Auth("malformed token".to_string()))?;
        Ok(ParsedToken {
            pairing_id: claims.pairing_id,
            role: claims.role,
        })
    }
}

/// Cryptographically verifies tokens issued by the pairing side.
pub struct SignedAuthValidator {
    signer: Arc<dyn TokenSigner>,
}

impl SignedAuthValidator {
    pub fn new(signer: Arc<dyn TokenSigner>) -> Self {
        Self { signer }
    }
}

impl AuthValidator for SignedAuthValidator {
    fn validate_token(&self, token: &str) -> Result<ParsedToken> {
        let claims = self.signer.verify(token)?;
        Ok(ParsedToken {
            pairing_id: claims.pairing_id,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_core::{KeyedTokenSigner, TokenClaims};

    #[test]
    fn test_pass_through_decodes_claims() {
        let validator = PassThroughAuthValidator;
        let parsed = validator
            .validate_token(r#"{"pairingId":"p1","role":"initiator"}"#)
            .unwrap();
        assert_eq!(parsed.pairing_id, "p1");
        assert_eq!(parsed.role, Role::Initiator);
    }

    #[test]
    fn test_pass_through_rejects_garbage() {
        let validator = PassThroughAuthValidator;
        assert!(matches!(
            validator.validate_token("not json"),
            Err(Error::Auth(_))
        ));
        assert!(matches!(
            validator.validate_token(r#"{"role":"initiator"}"#),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn test_signed_validator_roundtrip() {
        let signer = Arc::new(KeyedTokenSigner::new("test-secret"));
        let token = signer
            .sign(&TokenClaims {
                role: Role::Responder,
                pairing_id: "p1".to_string(),
            })
            .unwrap();

        let validator = SignedAuthValidator::new(signer);
        let parsed = validator.validate_token(&token).unwrap();
        assert_eq!(parsed.pairing_id, "p1");
        assert_eq!(parsed.role, Role::Responder);
    }

    #[test]
    fn test_signed_validator_rejects_forgery() {
        let validator = SignedAuthValidator::new(Arc::new(KeyedTokenSigner::new("test-secret")));
        let forged = KeyedTokenSigner::new("wrong-secret")
            .sign(&TokenClaims {
                role: Role::Responder,
                pairing_id: "p1".to_string(),
            })
            .unwrap();
        assert!(matches!(
            validator.validate_token(&forged),
            Err(Error::Auth(_))
        ));
    }
}
