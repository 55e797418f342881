//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs that can both sign tokens and
//! publish themselves as JWKs. All fixtures are deterministic based on seed
//! values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::json;
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Ed25519 signing key with a key id, as the identity provider would hold it.
///
/// # Example
/// ```rust,ignore
/// let key = TestKeypair::new(1, "key-1");
/// let jwks = serde_json::json!({ "keys": [key.jwk_json()] });
/// let token = key.sign(&valid_claims("user-42"));
/// ```
#[derive(Clone)]
pub struct TestKeypair {
    kid: String,
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl TestKeypair {
    /// Create a keypair from a seed. The same seed always yields the same key.
    pub fn new(seed: u8, kid: &str) -> Self {
        Self::try_new(seed, kid).expect("deterministic Ed25519 keypair")
    }

    /// Fallible variant of [`TestKeypair::new`].
    pub fn try_new(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e)))?;

        Ok(Self {
            kid: kid.to_string(),
            pkcs8: build_pkcs8_from_seed(&seed_bytes),
            public_key: key_pair.public_key().as_ref().to_vec(),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Raw 32-byte public key.
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key
    }

    /// The public key as an RFC 8037 OKP JWK.
    pub fn jwk_json(&self) -> serde_json::Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": self.kid,
            "x": URL_SAFE_NO_PAD.encode(&self.public_key),
            "alg": "EdDSA",
            "use": "sig",
        })
    }

    /// Sign claims as a compact JWT with `alg: EdDSA` and this key's `kid`.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign claims with a caller-supplied header (e.g. a different `kid`).
    pub fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        let key = EncodingKey::from_ed_der(&self.pkcs8);
        jsonwebtoken::encode(header, claims, &key).expect("signing test token")
    }
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production code must use ring::rand::SystemRandom.
pub fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // SEQUENCE {
    //   version         INTEGER (0),
    //   algorithm       AlgorithmIdentifier (1.3.101.112),
    //   privateKey      OCTET STRING { OCTET STRING (32-byte seed) }
    // }
    let mut pkcs8 = Vec::with_capacity(48);

    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
