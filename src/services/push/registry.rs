//! Provider construction and the per-tenant provider registry.

use super::firebase_provider::{FirebaseEndpoints, FirebaseProvider};
use super::onesignal_provider::OneSignalProvider;
use super::provider::{
    ProviderKind, PushMessage, PushProvider, PushProviderConfig, SendResult, not_ready,
};
use super::webpush_provider::WebPushProvider;
use crate::config::{HttpConfig, PushSettings};
use crate::error::PushResult;
use crate::external::build_http_client;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Builds providers that share one HTTP client and endpoint settings
#[derive(Clone)]
pub struct ProviderFactory {
    http: reqwest::Client,
    web_push_concurrency: usize,
    onesignal_api: String,
    firebase: FirebaseEndpoints,
}

impl ProviderFactory {
    /// Creates a factory with production endpoints
    pub fn new(http: reqwest::Client) -> Self {
        Self::from_push_settings(http, &PushSettings::default())
    }

    /// Creates a factory from the `push` section, reusing `http`
    pub fn from_push_settings(http: reqwest::Client, settings: &PushSettings) -> Self {
        Self {
            http,
            web_push_concurrency: settings.web_push_concurrency,
            onesignal_api: settings.endpoints.onesignal_api.clone(),
            firebase: FirebaseEndpoints {
                fcm_base: settings.endpoints.fcm_api.clone(),
                iid_base: settings.endpoints.iid_api.clone(),
            },
        }
    }

    /// Creates a factory and its HTTP client from loaded settings
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn from_settings(http: &HttpConfig, push: &PushSettings) -> PushResult<Self> {
        let client = build_http_client(http)?;
        Ok(Self::from_push_settings(client, push))
    }

    /// Creates an uninitialized provider for `kind`
    ///
    /// Factory method pattern - returns Box<dyn PushProvider> so the caller
    /// can initialize it before sharing.
    pub fn create(&self, kind: ProviderKind) -> Box<dyn PushProvider> {
        match kind {
            ProviderKind::OneSignal => Box::new(OneSignalProvider::with_api_base(
                self.http.clone(),
                self.onesignal_api.clone(),
            )),
            ProviderKind::Firebase => Box::new(FirebaseProvider::with_endpoints(
                self.http.clone(),
                self.firebase.clone(),
            )),
            ProviderKind::WebPush => Box::new(WebPushProvider::with_concurrency(
                self.http.clone(),
                self.web_push_concurrency,
            )),
        }
    }

    /// Creates the provider selected by the config tag and initializes it
    ///
    /// # Returns
    /// A ready provider behind an `Arc`, shareable across tasks
    pub async fn connect(&self, config: &PushProviderConfig) -> PushResult<Arc<dyn PushProvider>> {
        let mut provider = self.create(config.kind());
        provider.initialize(config).await?;
        Ok(Arc::from(provider))
    }
}

/// Initialized providers keyed by tenant id
///
/// # Example
/// ```ignore
/// let registry = ProviderRegistry::new(ProviderFactory::new(HTTP_CLIENT.clone()));
/// registry.register("tenant-a", &tenant_config).await?;
/// let result = registry.send_to_devices("tenant-a", &tokens, &message).await;
/// ```
#[derive(Clone)]
pub struct ProviderRegistry {
    factory: ProviderFactory,
    providers: Arc<DashMap<String, Arc<dyn PushProvider>>>,
}

impl ProviderRegistry {
    pub fn new(factory: ProviderFactory) -> Self {
        Self {
            factory,
            providers: Arc::new(DashMap::new()),
        }
    }

    /// Initializes a provider for `tenant` and stores it, replacing any
    /// previous one only when initialization succeeds
    pub async fn register(&self, tenant: &str, config: &PushProviderConfig) -> PushResult<()> {
        let provider = self.factory.connect(config).await?;
        info!(tenant, provider = provider.name(), "Registered push provider");
        self.providers.insert(tenant.to_string(), provider);
        Ok(())
    }

    /// Stores an already initialized provider
    pub fn insert(&self, tenant: &str, provider: Arc<dyn PushProvider>) {
        self.providers.insert(tenant.to_string(), provider);
    }

    pub fn get(&self, tenant: &str) -> Option<Arc<dyn PushProvider>> {
        self.providers.get(tenant).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, tenant: &str) -> Option<Arc<dyn PushProvider>> {
        self.providers.remove(tenant).map(|(_, provider)| provider)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Sends through the tenant's provider; an unknown tenant behaves like a
    /// provider that is not ready
    pub async fn send_to_devices(
        &self,
        tenant: &str,
        tokens: &[String],
        message: &PushMessage,
    ) -> SendResult {
        match self.get(tenant) {
            Some(provider) => provider.send_to_devices(tokens, message).await,
            None => not_ready(tokens),
        }
    }

    pub async fn send_to_topic(&self, tenant: &str, topic: &str, message: &PushMessage) -> SendResult {
        match self.get(tenant) {
            Some(provider) => provider.send_to_topic(topic, message).await,
            None => not_ready(&[]),
        }
    }
}
