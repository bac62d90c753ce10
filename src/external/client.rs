use std::sync::LazyLock;
use std::time::Duration;

use crate::config::HttpConfig;

/// Builds the pooled HTTP client every push provider sends through
///
/// # Features
/// - **Connection pooling**: one client per process, idle connections kept per host
/// - **Compression**: gzip, deflate, brotli and zstd responses
/// - **HTTP/2**: adaptive window sizing and keep-alive for FCM fan-out
/// - **Security**: Rustls for TLS (no OpenSSL dependency)
///
/// # Errors
/// Returns the builder error when the TLS backend cannot be initialized.
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        // Timeouts
        .timeout(Duration::from_secs(config.request_timeout))
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        // Connection pooling
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(90))
        // HTTP/2 settings
        .http2_adaptive_window(true)
        .http2_keep_alive_interval(Duration::from_secs(10))
        .http2_keep_alive_timeout(Duration::from_secs(20))
        // Enable compression (gzip, deflate, brotli, zstd)
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .zstd(true)
        .user_agent(config.user_agent.as_str())
        .build()
}

/// Process-wide client built from default [`HttpConfig`]
///
/// Used by library callers that register tenants without loading settings.
///
/// # Example
/// ```ignore
/// use podpush::external::client::HTTP_CLIENT;
/// use podpush::services::push::OneSignalProvider;
///
/// let provider = OneSignalProvider::new(HTTP_CLIENT.clone());
/// ```
pub static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    build_http_client(&HttpConfig::default()).unwrap_or_else(|_| reqwest::Client::new())
});
