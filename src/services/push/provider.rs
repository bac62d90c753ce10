//! Core push provider trait and types.
//!
//! This module provides the vendor-neutral vocabulary every push backend
//! speaks, so callers stay polymorphic over OneSignal, Firebase and Web Push.

use crate::error::{PushError, PushResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Notification to deliver, shared by reference for the whole send call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Custom key/value payload delivered to the app
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// Android notification channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// iOS notification category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Provider credentials as stored in tenant settings.
///
/// Fields default to empty so a missing value surfaces as a configuration
/// error from `initialize` rather than a deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum PushProviderConfig {
    #[serde(rename = "onesignal")]
    OneSignal {
        #[serde(default)]
        app_id: String,
        #[serde(default)]
        api_key: String,
    },
    Firebase {
        #[serde(default)]
        project_id: String,
        /// Service-account JSON document
        #[serde(default)]
        credentials: String,
    },
    #[serde(rename = "webpush")]
    WebPush {
        #[serde(default)]
        vapid_public_key: String,
        #[serde(default)]
        vapid_private_key: String,
        #[serde(default)]
        vapid_subject: String,
    },
}

impl PushProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::OneSignal { .. } => ProviderKind::OneSignal,
            Self::Firebase { .. } => ProviderKind::Firebase,
            Self::WebPush { .. } => ProviderKind::WebPush,
        }
    }
}

/// Tag selecting the provider implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "onesignal")]
    OneSignal,
    Firebase,
    #[serde(rename = "webpush")]
    WebPush,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneSignal => "onesignal",
            Self::Firebase => "firebase",
            Self::WebPush => "webpush",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated outcome of one send call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub success_count: usize,
    pub failure_count: usize,
    /// Tokens known to have failed; completeness depends on the provider
    #[serde(default)]
    pub failed_tokens: Vec<String>,
    /// Present only when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    /// Failed call where none of the `attempted` recipients was reached
    pub fn failure(error: impl Into<String>, attempted: usize) -> Self {
        Self {
            success: false,
            failure_count: attempted,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Same as [`SendResult::failure`] but listing every token as failed
    pub fn failure_for_tokens(error: impl Into<String>, tokens: &[String]) -> Self {
        Self {
            failed_tokens: tokens.to_vec(),
            ..Self::failure(error, tokens.len())
        }
    }
}

/// Per-token tally folded into a [`SendResult`] by the fan-out providers
#[derive(Debug, Default)]
pub(crate) struct DeliveryTally {
    success_count: usize,
    failed_tokens: Vec<String>,
    first_error: Option<String>,
    message_id: Option<String>,
}

impl DeliveryTally {
    pub(crate) fn record(&mut self, token: &str, outcome: PushResult<Option<String>>) {
        match outcome {
            Ok(message_id) => {
                self.success_count += 1;
                if self.message_id.is_none() {
                    self.message_id = message_id;
                }
            }
            Err(error) => {
                self.failed_tokens.push(token.to_string());
                if self.first_error.is_none() {
                    self.first_error = Some(error.to_string());
                }
            }
        }
    }

    pub(crate) fn merge(&mut self, other: DeliveryTally) {
        self.success_count += other.success_count;
        self.failed_tokens.extend(other.failed_tokens);
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
        if self.message_id.is_none() {
            self.message_id = other.message_id;
        }
    }

    /// The call succeeds when at least one recipient was reached (or there
    /// was nobody to reach).
    pub(crate) fn finish(self) -> SendResult {
        let failure_count = self.failed_tokens.len();
        let success = self.success_count > 0 || failure_count == 0;
        let error = if success {
            None
        } else {
            Some(format!(
                "All {} deliveries failed: {}",
                failure_count,
                self.first_error.unwrap_or_default()
            ))
        };
        SendResult {
            success,
            message_id: self.message_id,
            success_count: self.success_count,
            failure_count,
            failed_tokens: self.failed_tokens,
            error,
        }
    }
}

/// Trait for push providers (OneSignal, Firebase, Web Push)
///
/// Uses `async_trait` to support async methods with dynamic dispatch.
/// All providers must be Send + Sync so one initialized instance can serve
/// concurrent callers behind an `Arc`.
///
/// # Example
/// ```ignore
/// let mut provider = WebPushProvider::new(HTTP_CLIENT.clone());
/// provider.initialize(&config).await?;
/// let result = provider.send_to_devices(&tokens, &message).await;
/// ```
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Returns the provider name for logging/debugging
    fn name(&self) -> &'static str;

    /// Validates credentials and prepares the provider for sending
    ///
    /// # Errors
    /// `PushError::Configuration` when the config is for another provider,
    /// incomplete, or rejected by the vendor during setup
    async fn initialize(&mut self, config: &PushProviderConfig) -> PushResult<()>;

    /// Whether `initialize` has completed successfully
    fn is_ready(&self) -> bool;

    /// Delivers `message` to each device token
    async fn send_to_devices(&self, tokens: &[String], message: &PushMessage) -> SendResult;

    /// Delivers `message` to every recipient of a vendor-side topic or segment
    async fn send_to_topic(&self, topic: &str, message: &PushMessage) -> SendResult;

    /// Adds tokens to a topic (optional capability)
    async fn subscribe_to_topic(&self, tokens: &[String], _topic: &str) -> SendResult {
        SendResult::failure_for_tokens(
            PushError::Unsupported {
                provider: self.name(),
                operation: "topic subscriptions",
            }
            .to_string(),
            tokens,
        )
    }

    /// Removes tokens from a topic (optional capability)
    async fn unsubscribe_from_topic(&self, tokens: &[String], _topic: &str) -> SendResult {
        SendResult::failure_for_tokens(
            PushError::Unsupported {
                provider: self.name(),
                operation: "topic subscriptions",
            }
            .to_string(),
            tokens,
        )
    }

    /// Cheap local check that a token is plausibly addressable
    fn validate_token(&self, token: &str) -> bool {
        !token.trim().is_empty()
    }
}

/// Shared guard for the send operations of a provider that is not ready
pub(crate) fn not_ready(tokens: &[String]) -> SendResult {
    SendResult::failure_for_tokens(PushError::NotReady.to_string(), tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let message = PushMessage::new("New episode", "Episode 42 is out")
            .with_data("episodeId", "42")
            .with_image("https://cdn.example.com/42.png")
            .with_badge(3)
            .with_sound("default")
            .with_channel("episodes")
            .with_category("EPISODE");

        assert_eq!(message.title, "New episode");
        assert_eq!(message.data.get("episodeId").map(String::as_str), Some("42"));
        assert_eq!(message.badge, Some(3));
        assert_eq!(message.channel_id.as_deref(), Some("episodes"));
        assert_eq!(message.category.as_deref(), Some("EPISODE"));
    }

    #[test]
    fn test_provider_config_tagged_deserialization() {
        let config: PushProviderConfig = serde_json::from_str(
            r#"{"provider":"webpush","vapid_public_key":"pub","vapid_private_key":"priv","vapid_subject":"mailto:a@b.c"}"#,
        )
        .unwrap();
        assert_eq!(config.kind(), ProviderKind::WebPush);

        let config: PushProviderConfig =
            serde_json::from_str(r#"{"provider":"onesignal","app_id":"app"}"#).unwrap();
        assert_eq!(
            config,
            PushProviderConfig::OneSignal {
                app_id: "app".to_string(),
                api_key: String::new(),
            }
        );
    }

    #[test]
    fn test_send_result_serializes_camel_case() {
        let result = SendResult {
            success: true,
            message_id: Some("abc".to_string()),
            success_count: 2,
            failure_count: 0,
            failed_tokens: vec![],
            error: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["messageId"], "abc");
        assert_eq!(json["successCount"], 2);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_tally_partial_failure_is_success() {
        let mut tally = DeliveryTally::default();
        tally.record("good", Ok(Some("m1".to_string())));
        tally.record("bad", Err(PushError::transport("HTTP 404")));

        let result = tally.finish();
        assert!(result.success);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.failed_tokens, vec!["bad".to_string()]);
        assert_eq!(result.message_id.as_deref(), Some("m1"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_tally_total_failure_reports_first_error() {
        let mut tally = DeliveryTally::default();
        tally.record("a", Err(PushError::transport("HTTP 500")));
        let mut other = DeliveryTally::default();
        other.record("b", Err(PushError::transport("HTTP 503")));
        tally.merge(other);

        let result = tally.finish();
        assert!(!result.success);
        assert_eq!(result.failure_count, 2);
        assert_eq!(result.error.as_deref(), Some("All 2 deliveries failed: HTTP 500"));
    }

    #[test]
    fn test_empty_tally_is_vacuous_success() {
        let result = DeliveryTally::default().finish();
        assert!(result.success);
        assert_eq!(result.success_count, 0);
        assert_eq!(result.failure_count, 0);
    }
}
