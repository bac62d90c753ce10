//! Service-account assertions for the OAuth2 JWT-bearer grant (RFC 7523)

use jiff::{SignedDuration, Timestamp};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

use crate::error::{PushError, PushResult};

/// Scope granting send access to Firebase Cloud Messaging
pub const FIREBASE_MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// Lifetime of a signed assertion; Google rejects anything above one hour
pub const ASSERTION_LIFETIME: SignedDuration = SignedDuration::from_hours(1);

/// Claims of the signed assertion exchanged for an access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AssertionClaims {
    /// Issuer (service account email)
    pub iss: String,
    /// Subject (service account email)
    pub sub: String,
    /// Audience (the token endpoint)
    pub aud: String,
    /// Space-separated OAuth scopes
    pub scope: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
}

impl AssertionClaims {
    /// Creates claims for `client_email` valid for [`ASSERTION_LIFETIME`] from `now`
    ///
    /// # Arguments
    /// * `client_email` - The service account's email address
    /// * `token_uri` - The OAuth2 token endpoint the assertion is addressed to
    /// * `scope` - Requested scope
    /// * `now` - Issue instant
    pub fn new(client_email: &str, token_uri: &str, scope: &str, now: Timestamp) -> Self {
        let iat = now.as_second();
        Self {
            iss: client_email.to_string(),
            sub: client_email.to_string(),
            aud: token_uri.to_string(),
            scope: scope.to_string(),
            iat,
            exp: iat + ASSERTION_LIFETIME.as_secs(),
        }
    }
}

/// Parses a PEM encoded RSA private key from a service account document
///
/// # Errors
/// `PushError::Configuration` keyed on `credentials.private_key` when the PEM
/// is not a usable RSA key
pub fn rsa_signing_key(pem: &str) -> PushResult<EncodingKey> {
    EncodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| PushError::configuration("credentials.private_key", e.to_string()))
}

/// Signs an RS256 assertion, stamping `kid` in the header when known
///
/// # Returns
/// The compact JWT to post as the `assertion` form field
pub fn sign_assertion(
    claims: &AssertionClaims,
    key: &EncodingKey,
    key_id: Option<&str>,
) -> PushResult<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key_id.filter(|id| !id.is_empty()).map(str::to_string);

    encode(&header, claims, key).map_err(|e| PushError::Internal {
        source: anyhow::anyhow!("Failed to sign service account assertion: {}", e),
    })
}
