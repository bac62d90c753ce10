//! Cryptographic building blocks for Web Push delivery.
//!
//! Everything here is assembled from primitive crates (P-256, HKDF-SHA256,
//! AES-128-GCM) so each step can be checked against the published test
//! vectors:
//! - [`der`]: DER encoded ECDSA signatures to the raw JWS form
//! - [`ece`]: the `aes128gcm` content encoding from RFC 8291
//! - [`vapid`]: VAPID key pairs and the signed `Authorization` header (RFC 8292)

pub mod der;
pub mod ece;
pub mod vapid;

pub use der::der_to_raw;
pub use vapid::{VapidKeys, VapidSigner};

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use p256::SecretKey;
use rand::Rng;
use thiserror::Error;

/// Errors raised by the Web Push crypto primitives
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid DER signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid key material for {field}: {reason}")]
    InvalidKey { field: &'static str, reason: String },

    #[error("Invalid base64url value for {field}")]
    InvalidEncoding { field: &'static str },

    #[error("Payload of {size} bytes does not fit in a single {limit}-byte record")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("AES-GCM operation failed")]
    Cipher,

    #[error("Invalid push endpoint: {0}")]
    InvalidEndpoint(String),
}

impl CryptoError {
    pub fn invalid_key(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            field,
            reason: reason.into(),
        }
    }
}

/// Encode bytes as unpadded base64url, the form browsers and VAPID use
pub fn b64url_encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, tolerating trailing `=` padding from some clients
pub fn b64url_decode(value: &str, field: &'static str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = value.trim();
    let decoded = if trimmed.ends_with('=') {
        URL_SAFE.decode(trimmed)
    } else {
        URL_SAFE_NO_PAD.decode(trimmed)
    };
    decoded.map_err(|_| CryptoError::InvalidEncoding { field })
}

/// Generate a random P-256 secret key.
///
/// Draws 32 random bytes until they form a valid scalar; the retry is only
/// taken for values >= the curve order, which practically never happens.
pub fn random_secret_key() -> SecretKey {
    let mut rng = rand::rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        if let Ok(key) = SecretKey::from_slice(&bytes) {
            return key;
        }
    }
}
