//! OneSignal push provider implementation.
//!
//! Sends notifications through the OneSignal REST API, which fans out to
//! APNs/FCM on its side. A single request covers every recipient, so the
//! per-token outcome is not observable here.
//!
//! OneSignal API Reference: https://documentation.onesignal.com/reference/create-notification

use super::provider::{PushMessage, PushProvider, PushProviderConfig, SendResult, not_ready};
use crate::error::{PushError, PushResult};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Production REST API base
pub const DEFAULT_API_BASE: &str = "https://onesignal.com/api/v1";

#[derive(Debug, Clone)]
struct Credentials {
    app_id: String,
    api_key: String,
}

/// Audience of a OneSignal notification
enum Audience<'a> {
    Players(&'a [String]),
    Segment(&'a str),
}

#[derive(Debug, Deserialize)]
struct CreateNotificationResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    recipients: Option<usize>,
}

/// OneSignal provider
///
/// # Example
/// ```ignore
/// let mut provider = OneSignalProvider::new(HTTP_CLIENT.clone());
/// provider
///     .initialize(&PushProviderConfig::OneSignal {
///         app_id: "app-id".to_string(),
///         api_key: "rest-api-key".to_string(),
///     })
///     .await?;
/// let result = provider.send_to_topic("Subscribed Users", &message).await;
/// ```
#[derive(Clone)]
pub struct OneSignalProvider {
    http: reqwest::Client,
    api_base: String,
    credentials: Option<Credentials>,
}

impl OneSignalProvider {
    /// Creates an uninitialized provider against the production API
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_api_base(http, DEFAULT_API_BASE)
    }

    /// Creates an uninitialized provider against a custom API base
    pub fn with_api_base(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    /// Builds the create-notification request body
    ///
    /// # Arguments
    /// * `app_id` - OneSignal application id
    /// * `message` - The notification to render
    /// * `audience` - Explicit player ids or a named segment
    fn build_request_body(app_id: &str, message: &PushMessage, audience: Audience<'_>) -> Value {
        let mut body = json!({
            "app_id": app_id,
            "headings": { "en": message.title },
            "contents": { "en": message.body },
        });

        match audience {
            Audience::Players(tokens) => body["include_player_ids"] = json!(tokens),
            Audience::Segment(segment) => body["included_segments"] = json!([segment]),
        }

        if !message.data.is_empty() {
            body["data"] = json!(message.data);
        }

        if let Some(image) = &message.image_url {
            body["big_picture"] = json!(image);
            body["ios_attachments"] = json!({ "id": image });
        }

        if let Some(sound) = &message.sound {
            body["ios_sound"] = json!(sound);
            body["android_sound"] = json!(sound);
        }

        if let Some(badge) = message.badge {
            body["ios_badgeType"] = json!("SetTo");
            body["ios_badgeCount"] = json!(badge);
        }

        if let Some(channel) = &message.channel_id {
            body["android_channel_id"] = json!(channel);
        }

        if let Some(category) = &message.category {
            body["ios_category"] = json!(category);
        }

        body
    }

    async fn create_notification(
        &self,
        credentials: &Credentials,
        body: &Value,
    ) -> PushResult<CreateNotificationResponse> {
        let response = self
            .http
            .post(format!("{}/notifications", self.api_base))
            .header(AUTHORIZATION, format!("Basic {}", credentials.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(PushError::http_status(status, &text));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl PushProvider for OneSignalProvider {
    fn name(&self) -> &'static str {
        "onesignal"
    }

    /// A failed initialize leaves the provider not ready
    async fn initialize(&mut self, config: &PushProviderConfig) -> PushResult<()> {
        self.credentials = None;

        let PushProviderConfig::OneSignal { app_id, api_key } = config else {
            return Err(PushError::configuration(
                "provider",
                format!("expected onesignal configuration, got {}", config.kind()),
            ));
        };

        if app_id.trim().is_empty() {
            return Err(PushError::configuration("app_id", "OneSignal app id is required"));
        }
        if api_key.trim().is_empty() {
            return Err(PushError::configuration("api_key", "OneSignal API key is required"));
        }

        self.credentials = Some(Credentials {
            app_id: app_id.clone(),
            api_key: api_key.clone(),
        });
        debug!(app_id = %app_id, "OneSignal provider initialized");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.credentials.is_some()
    }

    /// Sends to explicit player ids in one request
    ///
    /// OneSignal reports only how many players it will deliver to, so
    /// `failure_count` is the shortfall against `tokens.len()` and
    /// `failed_tokens` stays empty.
    #[instrument(skip_all, fields(provider = "onesignal", tokens = tokens.len()))]
    async fn send_to_devices(&self, tokens: &[String], message: &PushMessage) -> SendResult {
        let Some(credentials) = &self.credentials else {
            return not_ready(tokens);
        };
        if tokens.is_empty() {
            return SendResult {
                success: true,
                ..Default::default()
            };
        }

        let body = Self::build_request_body(
            &credentials.app_id,
            message,
            Audience::Players(tokens),
        );

        match self.create_notification(credentials, &body).await {
            Ok(response) => {
                let success_count = response.recipients.unwrap_or(0);
                let failure_count = tokens.len().saturating_sub(success_count);
                debug!(success_count, failure_count, "OneSignal accepted notification");
                SendResult {
                    success: true,
                    message_id: response.id,
                    success_count,
                    failure_count,
                    failed_tokens: Vec::new(),
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "OneSignal send failed");
                SendResult::failure(e.to_string(), tokens.len())
            }
        }
    }

    /// Sends to a OneSignal segment
    #[instrument(skip_all, fields(provider = "onesignal", segment = %topic))]
    async fn send_to_topic(&self, topic: &str, message: &PushMessage) -> SendResult {
        let Some(credentials) = &self.credentials else {
            return not_ready(&[]);
        };

        let body =
            Self::build_request_body(&credentials.app_id, message, Audience::Segment(topic));

        match self.create_notification(credentials, &body).await {
            Ok(response) => SendResult {
                success: true,
                message_id: response.id,
                success_count: response.recipients.unwrap_or(0),
                ..Default::default()
            },
            Err(e) => {
                warn!(error = %e, "OneSignal segment send failed");
                SendResult::failure(e.to_string(), 0)
            }
        }
    }

    /// Player ids are UUIDs
    fn validate_token(&self, token: &str) -> bool {
        Uuid::parse_str(token.trim()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_for_players() {
        let message = PushMessage::new("New episode", "Episode 42")
            .with_data("episodeId", "42")
            .with_image("https://cdn.example.com/42.png")
            .with_sound("chime.wav")
            .with_badge(5)
            .with_channel("episodes")
            .with_category("EPISODE");
        let tokens = vec!["p1".to_string(), "p2".to_string()];

        let body = OneSignalProvider::build_request_body("app", &message, Audience::Players(&tokens));

        assert_eq!(body["app_id"], "app");
        assert_eq!(body["headings"]["en"], "New episode");
        assert_eq!(body["contents"]["en"], "Episode 42");
        assert_eq!(body["include_player_ids"], json!(["p1", "p2"]));
        assert!(body.get("included_segments").is_none());
        assert_eq!(body["data"]["episodeId"], "42");
        assert_eq!(body["big_picture"], "https://cdn.example.com/42.png");
        assert_eq!(body["ios_attachments"]["id"], "https://cdn.example.com/42.png");
        assert_eq!(body["ios_sound"], "chime.wav");
        assert_eq!(body["android_sound"], "chime.wav");
        assert_eq!(body["ios_badgeType"], "SetTo");
        assert_eq!(body["ios_badgeCount"], 5);
        assert_eq!(body["android_channel_id"], "episodes");
        assert_eq!(body["ios_category"], "EPISODE");
    }

    #[test]
    fn test_request_body_for_segment_omits_empty_fields() {
        let message = PushMessage::new("Hi", "There");
        let body = OneSignalProvider::build_request_body("app", &message, Audience::Segment("Active"));

        assert_eq!(body["included_segments"], json!(["Active"]));
        assert!(body.get("include_player_ids").is_none());
        assert!(body.get("data").is_none());
        assert!(body.get("ios_badgeType").is_none());
    }

    #[tokio::test]
    async fn test_initialize_rejects_foreign_config() {
        let mut provider = OneSignalProvider::new(reqwest::Client::new());
        let err = provider
            .initialize(&PushProviderConfig::Firebase {
                project_id: "p".to_string(),
                credentials: "{}".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::Configuration { ref key, .. } if key == "provider"));
        assert!(!provider.is_ready());
    }

    #[tokio::test]
    async fn test_initialize_requires_api_key() {
        let mut provider = OneSignalProvider::new(reqwest::Client::new());
        let err = provider
            .initialize(&PushProviderConfig::OneSignal {
                app_id: "app".to_string(),
                api_key: " ".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::Configuration { ref key, .. } if key == "api_key"));
    }

    #[tokio::test]
    async fn test_failed_reinitialize_leaves_provider_not_ready() {
        let mut provider = OneSignalProvider::new(reqwest::Client::new());
        provider
            .initialize(&PushProviderConfig::OneSignal {
                app_id: "app".to_string(),
                api_key: "key".to_string(),
            })
            .await
            .unwrap();
        assert!(provider.is_ready());

        let err = provider
            .initialize(&PushProviderConfig::OneSignal {
                app_id: String::new(),
                api_key: "key".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::Configuration { ref key, .. } if key == "app_id"));
        assert!(!provider.is_ready());
        let result = provider
            .send_to_topic("Active", &PushMessage::new("t", "b"))
            .await;
        assert!(!result.success);
    }

    #[test]
    fn test_validate_token_expects_uuid() {
        let provider = OneSignalProvider::new(reqwest::Client::new());
        assert!(provider.validate_token("1dd608f2-c6a1-11e3-851d-000c2940e62c"));
        assert!(!provider.validate_token("not-a-player"));
        assert!(!provider.validate_token(""));
    }
}
