//! Send command handler
//!
//! Handles `send`, `topic`, `subscribe` and `unsubscribe` through the
//! configured provider.

use std::sync::Arc;

use crate::config::error::ConfigError;
use crate::config::settings::Settings;
use crate::error::PushResult;
use crate::services::push::{ProviderFactory, PushMessage, PushProvider, SendResult};
use tracing::warn;

/// Handler for the delivery commands
pub struct SendCommandHandler {
    config: Settings,
}

impl SendCommandHandler {
    /// Create a new send command handler
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    async fn connect(&self) -> PushResult<Arc<dyn PushProvider>> {
        let provider_config = self
            .config
            .push
            .provider
            .as_ref()
            .ok_or(ConfigError::MissingProvider)?;

        let factory = ProviderFactory::from_settings(&self.config.http, &self.config.push)?;
        factory.connect(provider_config).await
    }

    /// Send `message` to device tokens
    ///
    /// Tokens failing the provider's local check are still sent, so the
    /// vendor's verdict ends up in the result.
    pub async fn send_to_devices(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> PushResult<SendResult> {
        let provider = self.connect().await?;
        for token in tokens.iter().filter(|t| !provider.validate_token(t)) {
            warn!(token = %token, provider = provider.name(), "Token looks malformed");
        }
        Ok(provider.send_to_devices(tokens, message).await)
    }

    /// Send `message` to a topic or segment
    pub async fn send_to_topic(&self, topic: &str, message: &PushMessage) -> PushResult<SendResult> {
        let provider = self.connect().await?;
        Ok(provider.send_to_topic(topic, message).await)
    }

    /// Subscribe tokens to a topic
    pub async fn subscribe(&self, tokens: &[String], topic: &str) -> PushResult<SendResult> {
        let provider = self.connect().await?;
        Ok(provider.subscribe_to_topic(tokens, topic).await)
    }

    /// Unsubscribe tokens from a topic
    pub async fn unsubscribe(&self, tokens: &[String], topic: &str) -> PushResult<SendResult> {
        let provider = self.connect().await?;
        Ok(provider.unsubscribe_from_topic(tokens, topic).await)
    }
}
