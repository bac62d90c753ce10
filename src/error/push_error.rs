use crate::config::error::ConfigError;
use crate::crypto::CryptoError;
use thiserror::Error;

/// Error type shared by every push provider.
///
/// Only `Configuration` escapes `initialize`; the send operations fold the
/// other kinds into a failed `SendResult` so callers never see an error for
/// delivery-level problems.
#[derive(Error, Debug)]
pub enum PushError {
    /// Missing or invalid credentials; fatal until the provider is reconfigured
    #[error("Configuration error for {key}: {reason}")]
    Configuration { key: String, reason: String },

    /// Non-2xx response, network failure or a malformed vendor response
    #[error("{message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    /// Web Push subscription could not be parsed or encrypted for
    #[error("Encryption failed: {0}")]
    Encryption(#[from] CryptoError),

    /// Malformed device token (for Web Push, the subscription JSON)
    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    /// Send attempted before a successful `initialize`
    #[error("Push provider is not initialized")]
    NotReady,

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl PushError {
    pub fn configuration(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn http_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body)
        };
        Self::Transport {
            message,
            status: Some(status.as_u16()),
        }
    }

    /// HTTP status attached to a transport failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport {
            message: format!("Request failed: {}", error),
            status: error.status().map(|s| s.as_u16()),
        }
    }
}

impl From<serde_json::Error> for PushError {
    fn from(error: serde_json::Error) -> Self {
        Self::transport(format!("Malformed JSON: {}", error))
    }
}

impl From<ConfigError> for PushError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::ValidationError { field, message } => Self::Configuration {
                key: field,
                reason: message,
            },
            other => Self::configuration("settings", other.to_string()),
        }
    }
}

impl From<anyhow::Error> for PushError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal { source: error }
    }
}

/// Type alias for Result with PushError to simplify function signatures
pub type PushResult<T> = Result<T, PushError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_message_includes_body() {
        let err = PushError::http_status(reqwest::StatusCode::BAD_REQUEST, " {\"error\":\"x\"} ");
        assert_eq!(err.to_string(), "HTTP 400 Bad Request: {\"error\":\"x\"}");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_http_status_without_body() {
        let err = PushError::http_status(reqwest::StatusCode::GONE, "");
        assert_eq!(err.to_string(), "HTTP 410 Gone");
    }

    #[test]
    fn test_config_validation_error_keeps_field() {
        let err: PushError = ConfigError::validation("push.web_push_concurrency", "must be > 0").into();
        match err {
            PushError::Configuration { key, reason } => {
                assert_eq!(key, "push.web_push_concurrency");
                assert_eq!(reason, "must be > 0");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_message() {
        let err = PushError::Unsupported {
            provider: "webpush",
            operation: "topic messaging",
        };
        assert_eq!(err.to_string(), "webpush does not support topic messaging");
    }
}
