//! AWS client factory
//!
//! Sessions (`SdkConfig`) are cached per region and service clients per
//! `(service, region)` pair. The registry is created once by the startup
//! routine and shared through application state rather than living in a
//! global.

mod loader;
mod registry;

pub use loader::{ConfigLoader, DefaultConfigLoader};
pub use registry::{ClientKey, ClientRegistry, ServiceClient};

use thiserror::Error;

/// Errors raised while building AWS sessions or clients
#[derive(Debug, Error)]
pub enum AwsError {
    #[error("Failed to load AWS configuration: {0}")]
    Config(String),

    #[error("Cached client for {0} has an unexpected type")]
    ClientType(ClientKey),
}
