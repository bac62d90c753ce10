//! podpush library
//!
//! Provider-agnostic push notification delivery for OneSignal, Firebase
//! Cloud Messaging and browser Web Push, plus the configuration, logging and
//! CLI plumbing around it.

use shadow_rs::shadow;
shadow!(build);

pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod external;
pub mod logger;
pub mod services;
pub mod utils;

pub use error::{PushError, PushResult};
pub use services::push::{
    ProviderFactory, ProviderKind, ProviderRegistry, PushMessage, PushProvider,
    PushProviderConfig, SendResult,
};

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}

pub fn clap_long_version() -> &'static str {
    build::CLAP_LONG_VERSION
}
