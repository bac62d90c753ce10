//! Web Push provider (RFC 8030) with VAPID (RFC 8292) and `aes128gcm`
//! message encryption (RFC 8291).
//!
//! Each device token is a browser `PushSubscription` serialized as JSON.
//! Payloads are encrypted to the subscription's keys and posted straight to
//! the push service named by its endpoint; no intermediary is involved.

use super::provider::{
    DeliveryTally, PushMessage, PushProvider, PushProviderConfig, SendResult, not_ready,
};
use crate::crypto::{self, CryptoError, VapidKeys, VapidSigner, ece};
use crate::error::{PushError, PushResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use jiff::Timestamp;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, LOCATION};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use url::{Host, Url};

/// Default number of subscriptions delivered in parallel
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Seconds the push service should hold an undelivered message
pub const MESSAGE_TTL_SECS: u32 = 86_400;

/// Browser push subscription as returned by `PushManager.subscribe()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebPushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// base64url uncompressed P-256 point of the user agent
    pub p256dh: String,
    /// base64url 16-byte authentication secret
    pub auth: String,
}

/// Decoded key material of a validated subscription
struct RecipientKeys {
    p256dh: Vec<u8>,
    auth: Vec<u8>,
}

impl WebPushSubscription {
    /// Parses a device token and checks the endpoint and keys
    pub fn parse(token: &str) -> PushResult<Self> {
        Self::decode(token).map(|(subscription, _)| subscription)
    }

    fn decode(token: &str) -> PushResult<(Self, RecipientKeys)> {
        let subscription: Self = serde_json::from_str(token).map_err(|e| PushError::InvalidToken {
            reason: format!("subscription is not valid JSON: {}", e),
        })?;
        let keys = subscription.recipient_keys()?;
        Ok((subscription, keys))
    }

    /// Serializes the subscription into the token form stored by callers
    pub fn to_token(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn recipient_keys(&self) -> PushResult<RecipientKeys> {
        validate_endpoint(&self.endpoint)?;

        let p256dh = crypto::b64url_decode(&self.keys.p256dh, "keys.p256dh")?;
        if p256dh.len() != ece::PUBLIC_KEY_LEN || p256dh[0] != 0x04 {
            return Err(CryptoError::invalid_key(
                "keys.p256dh",
                format!("expected a {}-byte uncompressed point", ece::PUBLIC_KEY_LEN),
            )
            .into());
        }

        let auth = crypto::b64url_decode(&self.keys.auth, "keys.auth")?;
        if auth.len() != ece::AUTH_SECRET_LEN {
            return Err(CryptoError::invalid_key(
                "keys.auth",
                format!("expected {} bytes, got {}", ece::AUTH_SECRET_LEN, auth.len()),
            )
            .into());
        }

        Ok(RecipientKeys { p256dh, auth })
    }
}

/// Push endpoints must be https; plain http is tolerated for loopback push
/// services used in development.
fn validate_endpoint(endpoint: &str) -> PushResult<()> {
    let url = Url::parse(endpoint).map_err(|e| PushError::InvalidToken {
        reason: format!("invalid endpoint URL: {}", e),
    })?;

    let loopback = match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    };

    match url.scheme() {
        "https" => Ok(()),
        "http" if loopback => Ok(()),
        scheme => Err(PushError::InvalidToken {
            reason: format!("endpoint must use https, got '{}'", scheme),
        }),
    }
}

/// JSON document the service worker receives in its `push` event
#[derive(Debug, Serialize)]
struct NotificationPayload<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    data: &'a HashMap<String, String>,
}

impl<'a> From<&'a PushMessage> for NotificationPayload<'a> {
    fn from(message: &'a PushMessage) -> Self {
        Self {
            title: &message.title,
            body: &message.body,
            icon: message.image_url.as_deref(),
            badge: message.badge,
            data: &message.data,
        }
    }
}

/// Generates a fresh VAPID key pair for a new tenant
pub fn generate_vapid_keys() -> VapidKeys {
    VapidKeys::generate()
}

/// Web Push provider
///
/// # Example
/// ```ignore
/// let keys = generate_vapid_keys();
/// let mut provider = WebPushProvider::new(HTTP_CLIENT.clone());
/// provider
///     .initialize(&PushProviderConfig::WebPush {
///         vapid_public_key: keys.public_key,
///         vapid_private_key: keys.private_key,
///         vapid_subject: "mailto:ops@example.com".to_string(),
///     })
///     .await?;
/// let result = provider.send_to_devices(&subscriptions, &message).await;
/// ```
#[derive(Clone)]
pub struct WebPushProvider {
    http: reqwest::Client,
    concurrency: usize,
    signer: Option<VapidSigner>,
}

impl WebPushProvider {
    /// Creates an uninitialized provider with the default fan-out limit
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_concurrency(http, DEFAULT_CONCURRENCY)
    }

    /// Creates an uninitialized provider delivering to at most `concurrency`
    /// subscriptions at once
    pub fn with_concurrency(http: reqwest::Client, concurrency: usize) -> Self {
        Self {
            http,
            concurrency: concurrency.max(1),
            signer: None,
        }
    }

    /// Encrypts `payload` for one subscription and posts it
    ///
    /// # Returns
    /// The push service's message location, when it reports one
    async fn deliver(
        &self,
        signer: &VapidSigner,
        token: &str,
        payload: &[u8],
    ) -> PushResult<Option<String>> {
        let (subscription, keys) = WebPushSubscription::decode(token)?;

        let body = ece::encrypt(payload, &keys.p256dh, &keys.auth)?;
        let authorization = signer.authorization(&subscription.endpoint, Timestamp::now())?;

        let response = self
            .http
            .post(&subscription.endpoint)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_ENCODING, "aes128gcm")
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("TTL", MESSAGE_TTL_SECS.to_string())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Ok(location);
        }

        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            info!(
                endpoint = %subscription.endpoint,
                status = status.as_u16(),
                "Web Push subscription expired"
            );
        }

        let text = response.text().await.unwrap_or_default();
        Err(PushError::http_status(status, &text))
    }
}

/// Maps a signer construction failure onto the offending config key
fn vapid_config_error(error: CryptoError) -> PushError {
    match error {
        CryptoError::InvalidKey { field, reason } => PushError::configuration(field, reason),
        CryptoError::InvalidEncoding { field } => {
            PushError::configuration(field, "not valid base64url")
        }
        other => PushError::configuration("vapid", other.to_string()),
    }
}

#[async_trait]
impl PushProvider for WebPushProvider {
    fn name(&self) -> &'static str {
        "webpush"
    }

    /// A failed initialize leaves the provider not ready
    async fn initialize(&mut self, config: &PushProviderConfig) -> PushResult<()> {
        self.signer = None;

        let PushProviderConfig::WebPush {
            vapid_public_key,
            vapid_private_key,
            vapid_subject,
        } = config
        else {
            return Err(PushError::configuration(
                "provider",
                format!("expected webpush configuration, got {}", config.kind()),
            ));
        };

        for (key, value) in [
            ("vapid_public_key", vapid_public_key),
            ("vapid_private_key", vapid_private_key),
            ("vapid_subject", vapid_subject),
        ] {
            if value.trim().is_empty() {
                return Err(PushError::configuration(key, "value is required"));
            }
        }

        let subject = vapid_subject.trim();
        if !subject.starts_with("mailto:") && !subject.starts_with("https:") {
            warn!(
                subject,
                "VAPID subject should be a mailto: or https: URI; push services may reject it"
            );
        }

        let signer = VapidSigner::new(vapid_public_key.trim(), vapid_private_key.trim(), subject)
            .map_err(vapid_config_error)?;

        debug!(public_key = %signer.public_key(), "Web Push provider initialized");
        self.signer = Some(signer);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.signer.is_some()
    }

    /// Delivers to every subscription, at most `concurrency` at a time
    ///
    /// A bad subscription (malformed JSON, bad keys, rejected by its push
    /// service) fails only its own token.
    #[instrument(skip_all, fields(provider = "webpush", tokens = tokens.len()))]
    async fn send_to_devices(&self, tokens: &[String], message: &PushMessage) -> SendResult {
        let Some(signer) = &self.signer else {
            return not_ready(tokens);
        };

        let payload = match serde_json::to_vec(&NotificationPayload::from(message)) {
            Ok(payload) => payload,
            Err(e) => return SendResult::failure_for_tokens(e.to_string(), tokens),
        };

        let payload = payload.as_slice();
        let deliveries: Vec<_> = tokens
            .iter()
            .map(|token| async move { (token, self.deliver(signer, token, payload).await) })
            .collect();
        let outcomes: Vec<(&String, PushResult<Option<String>>)> = stream::iter(deliveries)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut tally = DeliveryTally::default();
        for (token, outcome) in outcomes {
            if let Err(e) = &outcome {
                debug!(error = %e, "Web Push delivery failed");
            }
            tally.record(token, outcome);
        }

        let result = tally.finish();
        info!(
            success_count = result.success_count,
            failure_count = result.failure_count,
            "Web Push send finished"
        );
        result
    }

    async fn send_to_topic(&self, _topic: &str, _message: &PushMessage) -> SendResult {
        SendResult::failure(
            PushError::Unsupported {
                provider: "Web Push",
                operation: "topic messaging",
            }
            .to_string(),
            0,
        )
    }

    /// Tokens must parse as a subscription with an https endpoint and
    /// correctly sized keys
    fn validate_token(&self, token: &str) -> bool {
        WebPushSubscription::parse(token).is_ok()
    }
}
