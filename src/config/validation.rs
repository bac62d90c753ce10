//! Configuration validation logic
//!
//! This module provides validation methods for all configuration structures
//! to ensure configuration values are within acceptable ranges and formats.

use url::Url;

use crate::config::error::ConfigError;
use crate::config::settings::{
    EndpointSettings, FileSettings, HttpConfig, LoggerSettings, PushSettings, Settings,
};

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

/// Upper bound on parallel Web Push deliveries per send call
const MAX_WEB_PUSH_CONCURRENCY: usize = 1000;

impl HttpConfig {
    /// Validate HTTP client configuration
    ///
    /// # Validation Rules
    /// - Request and connect timeouts must be greater than 0
    /// - User agent must not be empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout == 0 {
            return Err(ConfigError::validation(
                "http.request_timeout",
                "Request timeout must be greater than 0 seconds.",
            ));
        }

        if self.connect_timeout == 0 {
            return Err(ConfigError::validation(
                "http.connect_timeout",
                "Connect timeout must be greater than 0 seconds.",
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::validation(
                "http.user_agent",
                "User agent cannot be empty.",
            ));
        }

        Ok(())
    }
}

impl EndpointSettings {
    /// Validate that every vendor base URL is an absolute http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("push.endpoints.onesignal_api", &self.onesignal_api),
            ("push.endpoints.fcm_api", &self.fcm_api),
            ("push.endpoints.iid_api", &self.iid_api),
        ] {
            let url = Url::parse(value).map_err(|e| ConfigError::ValidationError {
                field: field.to_string(),
                message: format!("Invalid URL '{}': {}", value, e),
            })?;
            if url.scheme() != "https" && url.scheme() != "http" {
                return Err(ConfigError::ValidationError {
                    field: field.to_string(),
                    message: format!("URL must use http or https, got '{}'", url.scheme()),
                });
            }
        }
        Ok(())
    }
}

impl PushSettings {
    /// Validate push configuration
    ///
    /// Provider credentials are checked by the provider itself on
    /// `initialize`; only structural limits are validated here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web_push_concurrency == 0 || self.web_push_concurrency > MAX_WEB_PUSH_CONCURRENCY {
            return Err(ConfigError::ValidationError {
                field: "push.web_push_concurrency".to_string(),
                message: format!(
                    "Web Push concurrency must be between 1 and {}, got {}.",
                    MAX_WEB_PUSH_CONCURRENCY, self.web_push_concurrency
                ),
            });
        }

        self.endpoints.validate()
    }
}

impl LoggerSettings {
    /// Validate logger configuration
    ///
    /// # Validation Rules
    /// - Level must be one of: trace, debug, info, warn, error
    /// - At least one output must be enabled
    /// - File settings must be valid when file output is enabled
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        if !self.console.enabled && !self.file.enabled {
            return Err(ConfigError::validation(
                "logger",
                "At least one output (console or file) must be enabled.",
            ));
        }

        self.file.validate()
    }
}

impl FileSettings {
    /// Validate file output settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path cannot be empty when file output is enabled.",
            ));
        }

        Ok(())
    }
}

impl Settings {
    /// Validate the complete settings tree
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.validate()?;
        self.push.validate()?;
        self.logger.validate()?;
        Ok(())
    }
}
