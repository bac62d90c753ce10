//! VAPID sender identification (RFC 8292).

use jiff::{SignedDuration, Timestamp};
use p256::SecretKey;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{DerSignature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{CryptoError, b64url_decode, b64url_encode, der_to_raw, random_secret_key};

/// Lifetime of a VAPID token; push services reject anything over 24h
pub const TOKEN_LIFETIME: SignedDuration = SignedDuration::from_hours(12);

/// A P-256 VAPID key pair in the base64url form tenants store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VapidKeys {
    /// Uncompressed public point (65 bytes), shared with browsers as the
    /// `applicationServerKey`
    pub public_key: String,
    /// Raw private scalar (32 bytes)
    pub private_key: String,
}

impl VapidKeys {
    /// Generate a fresh key pair for initial tenant setup
    pub fn generate() -> Self {
        let secret = random_secret_key();
        Self {
            public_key: b64url_encode(secret.public_key().to_encoded_point(false).as_bytes()),
            private_key: b64url_encode(secret.to_bytes()),
        }
    }
}

#[derive(Debug, Serialize)]
struct JwtHeader<'a> {
    typ: &'a str,
    alg: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VapidClaims {
    pub aud: String,
    pub exp: i64,
    pub sub: String,
}

/// Signs VAPID tokens for one application server identity
#[derive(Clone)]
pub struct VapidSigner {
    signing_key: SigningKey,
    public_key: String,
    subject: String,
}

impl std::fmt::Debug for VapidSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidSigner")
            .field("public_key", &self.public_key)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidSigner {
    /// Build a signer from base64url keys, checking that the public key
    /// belongs to the private key.
    pub fn new(
        public_key: &str,
        private_key: &str,
        subject: impl Into<String>,
    ) -> Result<Self, CryptoError> {
        let private_bytes = b64url_decode(private_key, "vapid_private_key")?;
        if private_bytes.len() != 32 {
            return Err(CryptoError::invalid_key(
                "vapid_private_key",
                format!("expected 32 bytes, got {}", private_bytes.len()),
            ));
        }
        let secret = SecretKey::from_slice(&private_bytes)
            .map_err(|_| CryptoError::invalid_key("vapid_private_key", "not a valid P-256 scalar"))?;

        let derived = secret.public_key().to_encoded_point(false);
        let configured = b64url_decode(public_key, "vapid_public_key")?;
        if configured.as_slice() != derived.as_bytes() {
            return Err(CryptoError::invalid_key(
                "vapid_public_key",
                "does not match the private key",
            ));
        }

        Ok(Self {
            signing_key: SigningKey::from(secret),
            public_key: b64url_encode(derived.as_bytes()),
            subject: subject.into(),
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Signed ES256 JWT for `endpoint`, valid for [`TOKEN_LIFETIME`] from `now`
    pub fn sign_token(&self, endpoint: &str, now: Timestamp) -> Result<String, CryptoError> {
        let claims = VapidClaims {
            aud: audience(endpoint)?,
            exp: (now + TOKEN_LIFETIME).as_second(),
            sub: self.subject.clone(),
        };
        let header = JwtHeader {
            typ: "JWT",
            alg: "ES256",
        };

        let signing_input = format!(
            "{}.{}",
            b64url_encode(to_json(&header)?),
            b64url_encode(to_json(&claims)?)
        );

        let signature: DerSignature = self.signing_key.sign(signing_input.as_bytes());
        let raw = der_to_raw(signature.as_bytes())?;

        Ok(format!("{}.{}", signing_input, b64url_encode(raw)))
    }

    /// Value of the `Authorization` header for a push to `endpoint`
    pub fn authorization(&self, endpoint: &str, now: Timestamp) -> Result<String, CryptoError> {
        let token = self.sign_token(endpoint, now)?;
        Ok(format!("vapid t={}, k={}", token, self.public_key))
    }
}

/// The `aud` claim: scheme, host and non-default port of the push endpoint
pub fn audience(endpoint: &str) -> Result<String, CryptoError> {
    let url = Url::parse(endpoint).map_err(|e| CryptoError::InvalidEndpoint(e.to_string()))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(CryptoError::InvalidEndpoint(format!(
            "{} has no origin",
            endpoint
        )));
    }
    Ok(origin.ascii_serialization())
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CryptoError> {
    serde_json::to_vec(value).map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}
