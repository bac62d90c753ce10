//! Firebase Cloud Messaging (HTTP v1) push provider.
//!
//! Authenticates with a service account: an RS256 assertion is exchanged for
//! a short-lived OAuth2 access token which is cached per provider and
//! refreshed lazily. Device sends fan out one request per token, bounded to
//! one batch in flight at a time.

use super::provider::{
    DeliveryTally, PushMessage, PushProvider, PushProviderConfig, SendResult, not_ready,
};
use crate::error::{PushError, PushResult};
use crate::utils::jwt::{self, AssertionClaims, FIREBASE_MESSAGING_SCOPE};
use async_trait::async_trait;
use futures::future::join_all;
use jiff::{SignedDuration, Timestamp};
use jsonwebtoken::EncodingKey;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Production FCM API base
pub const DEFAULT_FCM_BASE: &str = "https://fcm.googleapis.com";

/// Production Instance ID API base (topic management)
pub const DEFAULT_IID_BASE: &str = "https://iid.googleapis.com";

/// Token endpoint used when the service account omits `token_uri`
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Maximum device sends in flight per batch
pub const FCM_BATCH_SIZE: usize = 500;

/// Maximum tokens per batchAdd/batchRemove call
pub const IID_BATCH_SIZE: usize = 1000;

/// Registration tokens are ~160 characters; anything far beyond is garbage
const MAX_TOKEN_LEN: usize = 4096;

/// Access tokens are treated as expired this long before Google says so
const EXPIRY_MARGIN: SignedDuration = SignedDuration::from_secs(60);

/// Service account document as downloaded from the Google Cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// FCM and Instance ID base URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseEndpoints {
    pub fcm_base: String,
    pub iid_base: String,
}

impl Default for FirebaseEndpoints {
    fn default() -> Self {
        Self {
            fcm_base: DEFAULT_FCM_BASE.to_string(),
            iid_base: DEFAULT_IID_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Timestamp,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Everything `initialize` establishes; replaced wholesale on re-initialize
struct Session {
    project_id: String,
    account: ServiceAccountKey,
    signing_key: EncodingKey,
    token: Mutex<Option<AccessToken>>,
}

// ============================================================================
// FCM v1 wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    notification: FcmNotification<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a HashMap<String, String>>,
    android: AndroidConfig<'a>,
    apns: ApnsConfig<'a>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AndroidConfig<'a> {
    priority: &'static str,
    notification: AndroidNotification<'a>,
}

#[derive(Debug, Serialize)]
struct AndroidNotification<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApnsConfig<'a> {
    payload: ApnsPayload<'a>,
}

#[derive(Debug, Serialize)]
struct ApnsPayload<'a> {
    aps: Aps<'a>,
}

#[derive(Debug, Serialize)]
struct Aps<'a> {
    alert: ApsAlert<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApsAlert<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Serialize)]
struct TopicBatchRequest<'a> {
    to: String,
    registration_tokens: &'a [String],
}

#[derive(Debug, Deserialize)]
struct TopicBatchResponse {
    #[serde(default)]
    results: Vec<TopicBatchResult>,
}

#[derive(Debug, Deserialize)]
struct TopicBatchResult {
    #[serde(default)]
    error: Option<String>,
}

/// Where an FCM message is addressed
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Token(&'a str),
    Topic(&'a str),
}

fn build_message<'a>(target: Target<'a>, message: &'a PushMessage) -> FcmMessage<'a> {
    let (token, topic) = match target {
        Target::Token(token) => (Some(token), None),
        Target::Topic(topic) => (None, Some(topic)),
    };

    FcmMessage {
        token,
        topic,
        notification: FcmNotification {
            title: &message.title,
            body: &message.body,
            image: message.image_url.as_deref(),
        },
        data: (!message.data.is_empty()).then_some(&message.data),
        android: AndroidConfig {
            priority: "high",
            notification: AndroidNotification {
                channel_id: message.channel_id.as_deref(),
                sound: message.sound.as_deref(),
            },
        },
        apns: ApnsConfig {
            payload: ApnsPayload {
                aps: Aps {
                    alert: ApsAlert {
                        title: &message.title,
                        body: &message.body,
                    },
                    badge: message.badge,
                    sound: message.sound.as_deref(),
                    category: message.category.as_deref(),
                },
            },
        },
    }
}

/// Topic names are accepted with or without the `/topics/` prefix
fn topic_name(topic: &str) -> &str {
    topic.strip_prefix("/topics/").unwrap_or(topic)
}

/// Splits device tokens into the batches sent one after another
fn send_batches(tokens: &[String]) -> std::slice::Chunks<'_, String> {
    tokens.chunks(FCM_BATCH_SIZE)
}

#[derive(Debug, Clone, Copy)]
enum TopicOperation {
    Subscribe,
    Unsubscribe,
}

impl TopicOperation {
    fn path(self) -> &'static str {
        match self {
            Self::Subscribe => "iid/v1:batchAdd",
            Self::Unsubscribe => "iid/v1:batchRemove",
        }
    }
}

/// Firebase Cloud Messaging provider
///
/// # Example
/// ```ignore
/// let mut provider = FirebaseProvider::new(HTTP_CLIENT.clone());
/// provider
///     .initialize(&PushProviderConfig::Firebase {
///         project_id: "my-project".to_string(),
///         credentials: std::fs::read_to_string("service-account.json")?,
///     })
///     .await?;
/// let result = provider.send_to_devices(&tokens, &message).await;
/// ```
pub struct FirebaseProvider {
    http: reqwest::Client,
    endpoints: FirebaseEndpoints,
    session: Option<Session>,
}

impl FirebaseProvider {
    /// Creates an uninitialized provider against the production APIs
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_endpoints(http, FirebaseEndpoints::default())
    }

    /// Creates an uninitialized provider against custom API bases
    pub fn with_endpoints(http: reqwest::Client, endpoints: FirebaseEndpoints) -> Self {
        Self {
            http,
            endpoints: FirebaseEndpoints {
                fcm_base: endpoints.fcm_base.trim_end_matches('/').to_string(),
                iid_base: endpoints.iid_base.trim_end_matches('/').to_string(),
            },
            session: None,
        }
    }

    /// Parses the `credentials` setting
    ///
    /// The value is the service account JSON itself, or a path to a file
    /// holding it.
    async fn load_service_account(credentials: &str) -> PushResult<ServiceAccountKey> {
        let credentials = credentials.trim();
        if credentials.is_empty() {
            return Err(PushError::configuration(
                "credentials",
                "Firebase service account credentials are required",
            ));
        }

        let document = if credentials.starts_with('{') {
            credentials.to_string()
        } else {
            tokio::fs::read_to_string(credentials).await.map_err(|e| {
                PushError::configuration(
                    "credentials",
                    format!("cannot read service account file '{}': {}", credentials, e),
                )
            })?
        };

        let account: ServiceAccountKey = serde_json::from_str(&document).map_err(|e| {
            PushError::configuration("credentials", format!("invalid service account JSON: {}", e))
        })?;

        if account.client_email.trim().is_empty() {
            return Err(PushError::configuration(
                "credentials.client_email",
                "service account client_email is empty",
            ));
        }

        Ok(account)
    }

    /// Exchanges a freshly signed assertion for an access token
    async fn fetch_access_token(&self, session: &Session) -> PushResult<AccessToken> {
        let now = Timestamp::now();
        let claims = AssertionClaims::new(
            &session.account.client_email,
            &session.account.token_uri,
            FIREBASE_MESSAGING_SCOPE,
            now,
        );
        let assertion = jwt::sign_assertion(
            &claims,
            &session.signing_key,
            Some(&session.account.private_key_id),
        )?;

        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &assertion)
            .finish();

        let response = self
            .http
            .post(&session.account.token_uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(PushError::http_status(status, &text));
        }

        let token: GoogleTokenResponse = serde_json::from_str(&text)?;
        let expires_at = SignedDuration::from_secs(token.expires_in)
            .checked_sub(EXPIRY_MARGIN)
            .and_then(|lifetime| now.checked_add(lifetime).ok())
            .ok_or_else(|| {
                PushError::transport(format!("Invalid token lifetime: {}s", token.expires_in))
            })?;

        debug!(
            client_email = %session.account.client_email,
            expires_in = token.expires_in,
            "Fetched Firebase access token"
        );

        Ok(AccessToken {
            value: token.access_token,
            expires_at,
        })
    }

    /// Returns a bearer token, refreshing it when missing or expired
    ///
    /// The slot lock is held across the exchange so concurrent callers that
    /// observe expiry wait for one refresh instead of issuing their own.
    async fn ensure_valid_token(&self, session: &Session) -> PushResult<String> {
        let mut slot = session.token.lock().await;

        if let Some(token) = slot.as_ref().filter(|t| Timestamp::now() < t.expires_at) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_access_token(session).await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn post_message(
        &self,
        session: &Session,
        access_token: &str,
        target: Target<'_>,
        message: &PushMessage,
    ) -> PushResult<Option<String>> {
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.endpoints.fcm_base, session.project_id
        );
        let request = SendRequest {
            message: build_message(target, message),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(PushError::http_status(status, &text));
        }

        let sent: SendResponse = serde_json::from_str(&text)?;
        Ok(Some(sent.name))
    }

    async fn send_batch(
        &self,
        session: &Session,
        batch: &[String],
        message: &PushMessage,
    ) -> DeliveryTally {
        let mut tally = DeliveryTally::default();

        let access_token = match self.ensure_valid_token(session).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Firebase token refresh failed");
                let reason = e.to_string();
                for token in batch {
                    tally.record(token, Err(PushError::transport(reason.clone())));
                }
                return tally;
            }
        };

        let sends = batch.iter().map(|token| {
            self.post_message(session, &access_token, Target::Token(token), message)
        });
        let outcomes = join_all(sends).await;

        for (token, outcome) in batch.iter().zip(outcomes) {
            if let Err(e) = &outcome {
                debug!(error = %e, "FCM rejected device token");
            }
            tally.record(token, outcome);
        }
        tally
    }

    async fn manage_topic(
        &self,
        tokens: &[String],
        topic: &str,
        operation: TopicOperation,
    ) -> SendResult {
        let Some(session) = &self.session else {
            return not_ready(tokens);
        };

        let topic = topic_name(topic);
        let mut tally = DeliveryTally::default();

        for chunk in tokens.chunks(IID_BATCH_SIZE) {
            let outcome = match self.ensure_valid_token(session).await {
                Ok(access_token) => {
                    self.post_topic_batch(&access_token, chunk, topic, operation)
                        .await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(results) => {
                    for (index, token) in chunk.iter().enumerate() {
                        let error = results.get(index).and_then(|r| r.error.clone());
                        let result = match error {
                            Some(reason) => Err(PushError::InvalidToken { reason }),
                            None => Ok(None),
                        };
                        tally.record(token, result);
                    }
                }
                Err(e) => {
                    warn!(error = %e, topic, "Firebase topic management failed");
                    let reason = e.to_string();
                    for token in chunk {
                        tally.record(token, Err(PushError::transport(reason.clone())));
                    }
                }
            }
        }

        tally.finish()
    }

    async fn post_topic_batch(
        &self,
        access_token: &str,
        tokens: &[String],
        topic: &str,
        operation: TopicOperation,
    ) -> PushResult<Vec<TopicBatchResult>> {
        let url = format!("{}/{}", self.endpoints.iid_base, operation.path());
        let request = TopicBatchRequest {
            to: format!("/topics/{}", topic),
            registration_tokens: tokens,
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .header("access_token_auth", "true")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(PushError::http_status(status, &text));
        }

        let parsed: TopicBatchResponse = serde_json::from_str(&text)?;
        Ok(parsed.results)
    }
}

#[async_trait]
impl PushProvider for FirebaseProvider {
    fn name(&self) -> &'static str {
        "firebase"
    }

    /// Parses credentials and fetches the first access token
    ///
    /// A failed initialize leaves the provider not ready, even if an earlier
    /// initialize had succeeded.
    async fn initialize(&mut self, config: &PushProviderConfig) -> PushResult<()> {
        self.session = None;

        let PushProviderConfig::Firebase {
            project_id,
            credentials,
        } = config
        else {
            return Err(PushError::configuration(
                "provider",
                format!("expected firebase configuration, got {}", config.kind()),
            ));
        };

        let account = Self::load_service_account(credentials).await?;
        let project_id = if project_id.trim().is_empty() {
            account.project_id.clone()
        } else {
            project_id.trim().to_string()
        };
        if project_id.is_empty() {
            return Err(PushError::configuration(
                "project_id",
                "Firebase project id is required",
            ));
        }

        let signing_key = jwt::rsa_signing_key(&account.private_key)?;
        let session = Session {
            project_id,
            account,
            signing_key,
            token: Mutex::new(None),
        };

        let token = self.fetch_access_token(&session).await.map_err(|e| {
            PushError::configuration("credentials", format!("token exchange failed: {}", e))
        })?;
        *session.token.lock().await = Some(token);

        info!(project_id = %session.project_id, "Firebase provider initialized");
        self.session = Some(session);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    /// Sends one FCM request per token, batch by batch
    #[instrument(skip_all, fields(provider = "firebase", tokens = tokens.len()))]
    async fn send_to_devices(&self, tokens: &[String], message: &PushMessage) -> SendResult {
        let Some(session) = &self.session else {
            return not_ready(tokens);
        };

        let mut tally = DeliveryTally::default();
        for batch in send_batches(tokens) {
            tally.merge(self.send_batch(session, batch, message).await);
        }

        let result = tally.finish();
        info!(
            success_count = result.success_count,
            failure_count = result.failure_count,
            "Firebase device send finished"
        );
        result
    }

    #[instrument(skip_all, fields(provider = "firebase", topic = %topic))]
    async fn send_to_topic(&self, topic: &str, message: &PushMessage) -> SendResult {
        let Some(session) = &self.session else {
            return not_ready(&[]);
        };

        let outcome = match self.ensure_valid_token(session).await {
            Ok(access_token) => {
                self.post_message(session, &access_token, Target::Topic(topic_name(topic)), message)
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(message_id) => SendResult {
                success: true,
                message_id,
                success_count: 1,
                ..Default::default()
            },
            Err(e) => {
                warn!(error = %e, "Firebase topic send failed");
                SendResult::failure(e.to_string(), 0)
            }
        }
    }

    async fn subscribe_to_topic(&self, tokens: &[String], topic: &str) -> SendResult {
        self.manage_topic(tokens, topic, TopicOperation::Subscribe).await
    }

    async fn unsubscribe_from_topic(&self, tokens: &[String], topic: &str) -> SendResult {
        self.manage_topic(tokens, topic, TopicOperation::Unsubscribe).await
    }

    /// Registration tokens are opaque but never blank, spaced or huge
    fn validate_token(&self, token: &str) -> bool {
        !token.is_empty()
            && token.len() <= MAX_TOKEN_LEN
            && !token.chars().any(char::is_whitespace)
    }
}
