//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs. The same seed always produces the
//! same keypair.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::EncodingKey;
use ring::signature::{Ed25519KeyPair, KeyPair};

/// Ed25519 signing key with its key id.
#[derive(Clone)]
pub struct TestKeypair {
    kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a deterministic keypair from a seed (0-255).
    pub fn new(seed: u8, kid: &str) -> Self {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Signing key for `jsonwebtoken::encode`.
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ed_der(&self.private_key_pkcs8)
    }

    /// Public key as a JWK (OKP / Ed25519).
    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production code must use ring::rand::SystemRandom.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // SEQUENCE { version INTEGER 0, AlgorithmIdentifier { OID 1.3.101.112 },
    //            OCTET STRING { OCTET STRING seed } }
    let mut pkcs8 = Vec::with_capacity(48);
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);
    pkcs8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_is_deterministic() {
        let a = TestKeypair::new(1, "k1");
        let b = TestKeypair::new(1, "k1");
        assert_eq!(a.jwk_json(), b.jwk_json());
    }

    #[test]
    fn test_different_seeds_produce_different_keys() {
        let a = TestKeypair::new(1, "k");
        let b = TestKeypair::new(2, "k");
        assert_ne!(a.jwk_json()["x"], b.jwk_json()["x"]);
    }

    #[test]
    fn test_pkcs8_is_accepted_by_ring() {
        let keypair = TestKeypair::new(7, "k");
        assert!(Ed25519KeyPair::from_pkcs8_maybe_unchecked(&keypair.private_key_pkcs8).is_ok());
        assert_eq!(keypair.private_key_pkcs8.len(), 48);
    }
}
