//! Push notification delivery with pluggable providers.
//!
//! The core trait `PushProvider` hides three incompatible vendor protocols
//! behind one interface: OneSignal (REST aggregator), Firebase Cloud
//! Messaging HTTP v1 (OAuth2 service account) and raw Web Push (VAPID +
//! `aes128gcm`). Callers pick a provider from the tenant's
//! `PushProviderConfig` through [`ProviderFactory`] and never branch on the
//! concrete type.

pub mod firebase_provider;
pub mod onesignal_provider;
mod provider;
mod registry;
pub mod webpush_provider;

pub use firebase_provider::{FirebaseEndpoints, FirebaseProvider, ServiceAccountKey};
pub use onesignal_provider::OneSignalProvider;
pub use provider::{
    ProviderKind, PushMessage, PushProvider, PushProviderConfig, SendResult,
};
pub use registry::{ProviderFactory, ProviderRegistry};
pub use webpush_provider::{
    SubscriptionKeys, WebPushProvider, WebPushSubscription, generate_vapid_keys,
};
