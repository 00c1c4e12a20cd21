//! Bundle payload signing and verification.
//!
//! The signature is a base64-encoded digest computed over the exact
//! serialized payload bytes, so any byte-level tampering is detectable.
//! Two modes:
//!
//! - unkeyed SHA-256 (default): tamper evidence for bundles moved over
//!   trusted channels;
//! - keyed HMAC-SHA256: authenticity between instances sharing a
//!   `transfer.signing_secret`.
//!
//! The mode is not recorded in the bundle; the verifying side must be
//! configured the same way, and a mismatch surfaces as an integrity error.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Computes and checks bundle signatures.
#[derive(Debug, Clone)]
pub struct Signer {
    secret: Option<Vec<u8>>,
}

impl Signer {
    /// Unkeyed SHA-256 digest mode.
    pub fn digest_only() -> Self {
        Self { secret: None }
    }

    /// Keyed HMAC-SHA256 mode.
    pub fn with_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Some(secret.into()),
        }
    }

    /// Build from an optional configured secret.
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(s) if !s.is_empty() => Self::with_secret(s.as_bytes().to_vec()),
            _ => Self::digest_only(),
        }
    }

    /// Sign the exact payload bytes.
    pub fn sign(&self, payload: &[u8]) -> String {
        let digest = match &self.secret {
            Some(key) => {
                let mut mac = HmacSha256::new_from_slice(key)
                    .expect("HMAC can take a key of any size");
                mac.update(payload);
                mac.finalize().into_bytes().to_vec()
            }
            None => Sha256::digest(payload).to_vec(),
        };
        BASE64.encode(digest)
    }

    /// Verify a signature against the exact payload bytes.
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<()> {
        if self.sign(payload) == signature {
            Ok(())
        } else {
            Err(Error::Integrity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_sign_verify() {
        let signer = Signer::digest_only();
        let sig = signer.sign(b"payload bytes");
        assert!(signer.verify(b"payload bytes", &sig).is_ok());
    }

    #[test]
    fn test_digest_is_deterministic() {
        let signer = Signer::digest_only();
        assert_eq!(signer.sign(b"same"), signer.sign(b"same"));
        assert_ne!(signer.sign(b"same"), signer.sign(b"different"));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = Signer::digest_only();
        let sig = signer.sign(b"payload bytes");
        let err = signer.verify(b"payload byteZ", &sig);
        assert!(matches!(err, Err(Error::Integrity)));
    }

    #[test]
    fn test_hmac_requires_matching_secret() {
        let signer = Signer::with_secret(b"shared secret".to_vec());
        let sig = signer.sign(b"payload");
        assert!(signer.verify(b"payload", &sig).is_ok());

        let other = Signer::with_secret(b"different secret".to_vec());
        assert!(matches!(other.verify(b"payload", &sig), Err(Error::Integrity)));

        // Keyed and unkeyed modes never cross-validate
        let unkeyed = Signer::digest_only();
        assert!(matches!(unkeyed.verify(b"payload", &sig), Err(Error::Integrity)));
    }

    #[test]
    fn test_from_secret_empty_means_digest() {
        assert_eq!(
            Signer::from_secret(Some("")).sign(b"x"),
            Signer::digest_only().sign(b"x")
        );
        assert_ne!(
            Signer::from_secret(Some("k")).sign(b"x"),
            Signer::digest_only().sign(b"x")
        );
    }
}
