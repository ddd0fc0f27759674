//! Process-lifetime cache of AWS sessions and service clients

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use aws_config::SdkConfig;
use dashmap::DashMap;
use tracing::{debug, info};

use super::{AwsError, ConfigLoader, DefaultConfigLoader};

/// An SDK client that can be built from a shared session
pub trait ServiceClient: Send + Sync + 'static {
    /// Service name used as the cache key (e.g. "s3")
    const SERVICE: &'static str;

    fn from_sdk_config(config: &SdkConfig) -> Self;
}

impl ServiceClient for aws_sdk_s3::Client {
    const SERVICE: &'static str = "s3";

    fn from_sdk_config(config: &SdkConfig) -> Self {
        // S3-compatible stores behind a custom endpoint rarely support
        // virtual-hosted bucket addressing.
        let force_path_style = config.endpoint_url().is_some();
        let s3_config = aws_sdk_s3::config::Builder::from(config)
            .force_path_style(force_path_style)
            .build();
        aws_sdk_s3::Client::from_conf(s3_config)
    }
}

/// Cache key for a service client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub service: &'static str,
    pub region: Option<String>,
}

impl ClientKey {
    pub fn new(service: &'static str, region: Option<&str>) -> Self {
        Self {
            service,
            region: region.map(str::to_string),
        }
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.region {
            Some(ref region) => write!(f, "{}@{}", self.service, region),
            None => write!(f, "{}@default", self.service),
        }
    }
}

type SharedClient = Arc<dyn Any + Send + Sync>;

/// Memoizing factory for AWS clients
///
/// Handles are created lazily on first request and kept until the registry
/// is dropped. Two tasks racing on an empty slot may both build a client,
/// but only the first one stored is ever handed out.
pub struct ClientRegistry {
    loader: Box<dyn ConfigLoader>,
    sessions: DashMap<Option<String>, Arc<SdkConfig>>,
    clients: DashMap<ClientKey, SharedClient>,
}

impl ClientRegistry {
    /// Create a registry backed by the SDK's default provider chains
    pub fn new() -> Self {
        Self::with_loader(DefaultConfigLoader::new())
    }

    pub fn with_loader(loader: impl ConfigLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            sessions: DashMap::new(),
            clients: DashMap::new(),
        }
    }

    /// Get the shared session for a region, loading it on first use
    pub async fn session(&self, region: Option<&str>) -> Result<Arc<SdkConfig>, AwsError> {
        let key = region.map(str::to_string);

        let cached = self.sessions.get(&key).map(|s| Arc::clone(s.value()));
        if let Some(session) = cached {
            return Ok(session);
        }

        let loaded = Arc::new(self.loader.load(region).await?);
        let session = Arc::clone(self.sessions.entry(key).or_insert(loaded).value());

        debug!(region = ?region, "Cached AWS session");
        Ok(session)
    }

    /// Get the cached client for `C` in `region`, building it on first use
    pub async fn client<C: ServiceClient>(&self, region: Option<&str>) -> Result<Arc<C>, AwsError> {
        let key = ClientKey::new(C::SERVICE, region);

        let cached = self.clients.get(&key).map(|c| Arc::clone(c.value()));
        if let Some(handle) = cached {
            return downcast(key, handle);
        }

        let session = self.session(region).await?;
        let built: SharedClient = Arc::new(C::from_sdk_config(&session));
        let handle = Arc::clone(self.clients.entry(key.clone()).or_insert(built).value());

        info!(client = %key, "Created AWS client");
        downcast(key, handle)
    }

    /// Shorthand for the S3 client
    pub async fn s3(&self, region: Option<&str>) -> Result<Arc<aws_sdk_s3::Client>, AwsError> {
        self.client::<aws_sdk_s3::Client>(region).await
    }

    /// Number of cached client handles
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn downcast<C: ServiceClient>(key: ClientKey, handle: SharedClient) -> Result<Arc<C>, AwsError> {
    handle.downcast::<C>().map_err(|_| AwsError::ClientType(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aws_config::BehaviorVersion;
    use aws_sdk_s3::config::{Credentials, Region};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Loader with fixed credentials that counts how often it is called
    #[derive(Clone, Default)]
    struct CountingLoader {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ConfigLoader for CountingLoader {
        async fn load(&self, region: Option<&str>) -> Result<SdkConfig, AwsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let region = region.unwrap_or("us-east-1").to_string();
            Ok(aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region))
                .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
                .load()
                .await)
        }
    }

    /// Minimal client recording the region of the session it was built from
    struct RegionEcho {
        region: Option<String>,
    }

    impl ServiceClient for RegionEcho {
        const SERVICE: &'static str = "echo";

        fn from_sdk_config(config: &SdkConfig) -> Self {
            Self {
                region: config.region().map(|r| r.as_ref().to_string()),
            }
        }
    }

    /// Shares the service name of `RegionEcho` with a different type
    struct Impostor;

    impl ServiceClient for Impostor {
        const SERVICE: &'static str = "echo";

        fn from_sdk_config(_config: &SdkConfig) -> Self {
            Impostor
        }
    }

    #[tokio::test]
    async fn test_same_key_returns_same_handle() {
        let loader = CountingLoader::default();
        let registry = ClientRegistry::with_loader(loader.clone());

        let first = registry.client::<RegionEcho>(Some("eu-west-1")).await.unwrap();
        let second = registry.client::<RegionEcho>(Some("eu-west-1")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.region.as_deref(), Some("eu-west-1"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_regions_are_cached_separately() {
        let loader = CountingLoader::default();
        let registry = ClientRegistry::with_loader(loader.clone());

        let west = registry.client::<RegionEcho>(Some("us-west-2")).await.unwrap();
        let east = registry.client::<RegionEcho>(Some("us-east-2")).await.unwrap();
        let default = registry.client::<RegionEcho>(None).await.unwrap();

        assert!(!Arc::ptr_eq(&west, &east));
        assert_eq!(west.region.as_deref(), Some("us-west-2"));
        assert_eq!(east.region.as_deref(), Some("us-east-2"));
        assert_eq!(default.region.as_deref(), Some("us-east-1"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_services_share_one_session_per_region() {
        let loader = CountingLoader::default();
        let registry = ClientRegistry::with_loader(loader.clone());

        let s3 = registry.s3(Some("ap-south-1")).await.unwrap();
        let echo = registry.client::<RegionEcho>(Some("ap-south-1")).await.unwrap();

        assert_eq!(echo.region.as_deref(), Some("ap-south-1"));
        assert!(Arc::ptr_eq(&s3, &registry.s3(Some("ap-south-1")).await.unwrap()));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_session_is_cached() {
        let registry = ClientRegistry::with_loader(CountingLoader::default());

        let a = registry.session(Some("sa-east-1")).await.unwrap();
        let b = registry.session(Some("sa-east-1")).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_agree_on_one_handle() {
        let registry = Arc::new(ClientRegistry::with_loader(CountingLoader::default()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.client::<RegionEcho>(Some("eu-north-1")).await })
            })
            .collect();

        let handles: Vec<Arc<RegionEcho>> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let cached = registry.client::<RegionEcho>(Some("eu-north-1")).await.unwrap();
        for handle in &handles {
            assert!(Arc::ptr_eq(handle, &cached));
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_service_name_is_rejected() {
        let registry = ClientRegistry::with_loader(CountingLoader::default());

        registry.client::<RegionEcho>(None).await.unwrap();
        let err = registry.client::<Impostor>(None).await.err().unwrap();

        assert!(matches!(err, AwsError::ClientType(ref key) if key.service == "echo"));
        assert_eq!(err.to_string(), "Cached client for echo@default has an unexpected type");
    }

    #[tokio::test]
    async fn test_failed_session_is_not_cached() {
        let registry = ClientRegistry::with_loader(DefaultConfigLoader::with_endpoint("::not-a-url"));

        let err = registry.s3(Some("us-east-1")).await.err().unwrap();
        assert!(matches!(err, AwsError::Config(_)));
        assert!(registry.is_empty());

        // The failure is reported again rather than served from the cache
        assert!(registry.session(Some("us-east-1")).await.is_err());
    }

    #[test]
    fn test_client_key_display() {
        assert_eq!(ClientKey::new("s3", Some("us-east-1")).to_string(), "s3@us-east-1");
        assert_eq!(ClientKey::new("sqs", None).to_string(), "sqs@default");
    }
}
