//! Service layer for push delivery.

pub mod push;

pub use push::{ProviderFactory, ProviderRegistry};
