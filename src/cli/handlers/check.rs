//! Check command handler
//!
//! Initializes the configured provider to prove its credentials work.

use crate::config::error::ConfigError;
use crate::config::settings::Settings;
use crate::error::PushResult;
use crate::services::push::ProviderFactory;

/// Handler for the check command
pub struct CheckCommandHandler {
    config: Settings,
}

impl CheckCommandHandler {
    /// Create a new check command handler
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Initialize the configured provider
    ///
    /// # Returns
    /// A human readable report line per verified item
    ///
    /// # Errors
    /// - No `[push.provider]` section
    /// - The provider rejected its configuration
    pub async fn execute(&self) -> PushResult<Vec<String>> {
        let provider_config = self
            .config
            .push
            .provider
            .as_ref()
            .ok_or(ConfigError::MissingProvider)?;

        let factory = ProviderFactory::from_settings(&self.config.http, &self.config.push)?;
        let provider = factory.connect(provider_config).await?;

        Ok(vec![
            "✓ Configuration is valid".to_string(),
            format!("✓ Provider '{}' initialized", provider.name()),
            format!("✓ Ready to send: {}", provider.is_ready()),
        ])
    }
}
