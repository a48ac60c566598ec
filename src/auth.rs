//! # Message Authentication
//!
//! The consumer treats signature verification as an opaque capability behind
//! [`MessageAuthenticator`]. [`Ed25519Authenticator`] is the implementation the
//! agent binary ships with: the server signs the raw message body and attaches
//! the base64 signature as the `signature` attribute.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, VerifyingKey};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid signature encoding: {0}")]
    InvalidSignature(String),
}

/// Verifies that a message body was produced by the trusted sender
pub trait MessageAuthenticator: Send + Sync + fmt::Debug {
    /// `Ok(true)` only when the signature is valid for the body
    fn verify(&self, body: &str, signature: &str) -> Result<bool, AuthenticationError>;
}

/// Ed25519 verification with a fixed server public key
#[derive(Clone)]
pub struct Ed25519Authenticator {
    verifying_key: VerifyingKey,
}

impl Ed25519Authenticator {
    pub fn new(verifying_key: VerifyingKey) -> Self {
        Self { verifying_key }
    }

    /// Create from a base64-encoded 32-byte public key
    pub fn from_base64(public_key: &str) -> Result<Self, AuthenticationError> {
        let bytes = STANDARD
            .decode(public_key.trim())
            .map_err(|e| AuthenticationError::InvalidPublicKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            AuthenticationError::InvalidPublicKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            ))
        })?;

        let verifying_key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| AuthenticationError::InvalidPublicKey(e.to_string()))?;
        Ok(Self::new(verifying_key))
    }
}

impl fmt::Debug for Ed25519Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Authenticator")
            .field("public_key", &STANDARD.encode(self.verifying_key.to_bytes()))
            .finish()
    }
}

impl MessageAuthenticator for Ed25519Authenticator {
    fn verify(&self, body: &str, signature: &str) -> Result<bool, AuthenticationError> {
        let bytes = STANDARD
            .decode(signature.trim())
            .map_err(|e| AuthenticationError::InvalidSignature(e.to_string()))?;
        let signature = Signature::from_slice(&bytes)
            .map_err(|e| AuthenticationError::InvalidSignature(e.to_string()))?;

        Ok(self
            .verifying_key
            .verify_strict(body.as_bytes(), &signature)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn authenticator() -> Ed25519Authenticator {
        let public_key = STANDARD.encode(signing_key().verifying_key().to_bytes());
        Ed25519Authenticator::from_base64(&public_key).unwrap()
    }

    fn sign(body: &str) -> String {
        STANDARD.encode(signing_key().sign(body.as_bytes()).to_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let body = r#"{"agentid":"123456789"}"#;
        assert_eq!(authenticator().verify(body, &sign(body)), Ok(true));
    }

    #[test]
    fn test_tampered_body() {
        let signature = sign(r#"{"agentid":"123456789"}"#);
        assert_eq!(
            authenticator().verify(r#"{"agentid":"987654321"}"#, &signature),
            Ok(false)
        );
    }

    #[test]
    fn test_signature_from_other_key() {
        let other = SigningKey::from_bytes(&[9u8; 32]);
        let body = "payload";
        let signature = STANDARD.encode(other.sign(body.as_bytes()).to_bytes());
        assert_eq!(authenticator().verify(body, &signature), Ok(false));
    }

    #[test]
    fn test_malformed_signature() {
        assert!(matches!(
            authenticator().verify("payload", "not base64!"),
            Err(AuthenticationError::InvalidSignature(_))
        ));
        assert!(matches!(
            authenticator().verify("payload", &STANDARD.encode([1u8; 10])),
            Err(AuthenticationError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_malformed_public_key() {
        assert!(Ed25519Authenticator::from_base64("%%%").is_err());
        assert!(Ed25519Authenticator::from_base64(&STANDARD.encode([1u8; 16])).is_err());
    }
}
