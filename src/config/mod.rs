//! Configuration module for the backend service

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::path::{Path, PathBuf};

use crate::storage::StaticCredentials;

/// Main application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub aws: AwsSettings,
    pub storage: StorageSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// AWS session configuration shared by every client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    /// Region for new clients; the SDK's region chain applies when unset
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack, R2)
    pub endpoint_url: Option<String>,
}

/// Object storage configuration
///
/// Explicit keys are optional. When both are set they replace the default
/// credential chain for the storage client.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub bucket: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: None,
        }
    }
}

impl StorageSettings {
    /// Explicit credentials, if both key id and secret are configured
    pub fn credentials(&self) -> Option<StaticCredentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                let credentials = StaticCredentials::new(id, secret);
                Some(match self.session_token {
                    Some(ref token) => credentials.with_session_token(token),
                    None => credentials,
                })
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "** redacted **"))
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with BACKEND_)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        Self::load_from(&config_dir)
    }

    /// Load configuration using files from `config_dir`
    pub fn load_from(config_dir: &Path) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local overrides (gitignored)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment variables (BACKEND_SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("BACKEND")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref endpoint) = self.aws.endpoint_url {
            url::Url::parse(endpoint).map_err(|e| {
                ConfigError::Message(format!("Invalid aws.endpoint_url '{}': {}", endpoint, e))
            })?;
        }

        let storage = &self.storage;
        if storage.access_key_id.is_some() != storage.secret_access_key.is_some() {
            return Err(ConfigError::Message(
                "storage.access_key_id and storage.secret_access_key must be set together".to_string(),
            ));
        }

        Ok(())
    }
}
