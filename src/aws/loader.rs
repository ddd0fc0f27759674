//! Session loading

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::Region;
use tracing::debug;

use super::AwsError;

/// Source of SDK configuration for a region
///
/// The registry calls this at most once per region under normal operation.
/// Implementations decide where credentials come from.
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    async fn load(&self, region: Option<&str>) -> Result<SdkConfig, AwsError>;
}

/// Loads configuration through the SDK's default provider chains
///
/// Credentials resolve from environment variables, then web identity and
/// instance/container roles, then the shared config files. When no region is
/// given the default region chain is used as well.
#[derive(Debug, Clone, Default)]
pub struct DefaultConfigLoader {
    endpoint_url: Option<String>,
}

impl DefaultConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send every request to a custom endpoint (MinIO, LocalStack, R2, ...)
    pub fn with_endpoint(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: Some(endpoint_url.into()),
        }
    }
}

#[async_trait]
impl ConfigLoader for DefaultConfigLoader {
    async fn load(&self, region: Option<&str>) -> Result<SdkConfig, AwsError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(ref endpoint) = self.endpoint_url {
            url::Url::parse(endpoint).map_err(|e| {
                AwsError::Config(format!("invalid endpoint URL '{}': {}", endpoint, e))
            })?;
            loader = loader.endpoint_url(endpoint);
        }

        let config = loader.load().await;

        debug!(
            requested_region = ?region,
            resolved_region = ?config.region().map(|r| r.as_ref().to_string()),
            endpoint = ?self.endpoint_url,
            "Loaded AWS configuration"
        );

        Ok(config)
    }
}
