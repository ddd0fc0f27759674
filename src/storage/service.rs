//! Bucket-scoped object storage wrapper

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use bytes::Bytes;
use futures::{stream, Stream, TryStreamExt};
use tracing::{debug, info, instrument, warn};

use super::backend::{ObjectBackend, ObjectMeta, PresignedUrl};
use super::error::{DeleteFailure, StorageError, StorageResult};
use super::s3::S3Backend;
use crate::aws::{AwsError, ClientRegistry, ServiceClient};

/// Lifetime of a presigned URL when the caller does not choose one
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 3600;

/// SigV4 query signatures are valid for at most seven days
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 7 * 24 * 3600;

/// Most keys S3 accepts in a single DeleteObjects request
pub const MAX_DELETE_BATCH: usize = 1000;

/// Explicit credentials that replace the default resolution chain
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl StaticCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    fn into_sdk(self) -> Credentials {
        Credentials::new(
            self.access_key_id,
            self.secret_access_key,
            self.session_token,
            None, // expiry
            "static-credentials",
        )
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

/// Object operations against a single bucket
///
/// Every method is one request to the backend, except listing (one request
/// per page) and batch delete (one request per [`MAX_DELETE_BATCH`] keys).
/// Nothing is cached or retried here.
#[derive(Clone)]
pub struct S3Service {
    bucket: String,
    backend: Arc<dyn ObjectBackend>,
}

impl S3Service {
    /// Wrap any backend
    pub fn with_backend(bucket: impl Into<String>, backend: Arc<dyn ObjectBackend>) -> Self {
        Self {
            bucket: bucket.into(),
            backend,
        }
    }

    /// Wrap an existing S3 client
    pub fn with_client(bucket: impl Into<String>, client: Arc<aws_sdk_s3::Client>) -> Self {
        Self::with_backend(bucket, Arc::new(S3Backend::new(client)))
    }

    /// Use the registry's cached S3 client for `region`
    pub async fn from_registry(
        registry: &ClientRegistry,
        bucket: impl Into<String>,
        region: Option<&str>,
    ) -> Result<Self, AwsError> {
        let client = registry.s3(region).await?;
        Ok(Self::with_client(bucket, client))
    }

    /// Build a dedicated S3 client
    ///
    /// When `credentials` is given it is the only credential source; otherwise
    /// the SDK's default chain applies. `endpoint_url` targets an
    /// S3-compatible store instead of AWS.
    pub async fn connect(
        bucket: impl Into<String>,
        region: Option<&str>,
        credentials: Option<StaticCredentials>,
        endpoint_url: Option<&str>,
    ) -> Self {
        let bucket = bucket.into();
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(credentials) = credentials {
            loader = loader.credentials_provider(credentials.into_sdk());
        }
        if let Some(endpoint) = endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        debug!(bucket = %bucket, region = ?region, endpoint = ?endpoint_url, "Created dedicated S3 client");

        let client = aws_sdk_s3::Client::from_sdk_config(&sdk_config);
        Self::with_client(bucket, Arc::new(client))
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a file from disk
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn upload_file(
        &self,
        file_path: &Path,
        key: &str,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let data = tokio::fs::read(file_path)
            .await
            .map_err(|e| StorageError::local_io(file_path, e))?;
        self.upload_bytes(Bytes::from(data), key, content_type).await
    }

    /// Upload bytes
    #[instrument(skip(self, data), fields(bucket = %self.bucket, size = data.len()))]
    pub async fn upload_bytes(
        &self,
        data: Bytes,
        key: &str,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let size = data.len();
        self.backend
            .put_object(&self.bucket, key, data, content_type)
            .await?;

        info!("Uploaded {} ({} bytes)", key, size);
        Ok(())
    }

    /// Download an object into a local file
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn download_file(&self, key: &str, file_path: &Path) -> StorageResult<()> {
        let data = self.backend.get_object(&self.bucket, key).await?;

        tokio::fs::write(file_path, &data)
            .await
            .map_err(|e| StorageError::local_io(file_path, e))?;

        debug!("Downloaded {} ({} bytes) to {}", key, data.len(), file_path.display());
        Ok(())
    }

    /// Read an object fully into memory
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn get_object_bytes(&self, key: &str) -> StorageResult<Bytes> {
        let data = self.backend.get_object(&self.bucket, key).await?;
        debug!("Read {} bytes from {}", data.len(), key);
        Ok(data)
    }

    /// List every key under `prefix`, following continuation tokens
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let keys: Vec<String> = self.list_pages(prefix).try_concat().await?;
        debug!("Listed {} objects with prefix: {:?}", keys.len(), prefix);
        Ok(keys)
    }

    /// Stream listing pages lazily, one request per page
    pub fn list_pages<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Stream<Item = StorageResult<Vec<String>>> + 'a {
        // Outer `None` means the last page has been returned
        stream::try_unfold(Some(None::<String>), move |state| async move {
            let Some(token) = state else {
                return Ok::<_, StorageError>(None);
            };

            let page = self.backend.list_page(&self.bucket, prefix, token).await?;
            let next = page.next_token.map(Some);
            Ok(Some((page.keys, next)))
        })
    }

    /// Delete one object
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.backend.delete_object(&self.bucket, key).await?;
        info!("Deleted {}", key);
        Ok(())
    }

    /// Delete many objects, in batches the service accepts
    ///
    /// Keys the service refuses are collected across all batches and
    /// returned together as [`StorageError::PartialDelete`]. If a batch fails
    /// outright after earlier batches went through, that batch and every
    /// batch after it are reported as failed keys carrying the request's
    /// error code, so the caller knows exactly what is left.
    #[instrument(skip(self, keys), fields(bucket = %self.bucket, count = keys.len()))]
    pub async fn delete_objects(&self, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut failures = Vec::new();
        for (index, batch) in keys.chunks(MAX_DELETE_BATCH).enumerate() {
            match self.backend.delete_objects(&self.bucket, batch).await {
                Ok(refused) => failures.extend(refused),
                // Nothing was deleted yet
                Err(e) if index == 0 => return Err(e),
                Err(e) => {
                    let attempted = index * MAX_DELETE_BATCH;
                    warn!(
                        error = %e,
                        deleted_batches = index,
                        remaining = keys.len() - attempted,
                        "Batch delete stopped early"
                    );
                    failures.extend(undeleted(&keys[attempted..], &e));
                    return Err(StorageError::PartialDelete { failures });
                }
            }
        }

        if !failures.is_empty() {
            return Err(StorageError::PartialDelete { failures });
        }

        info!("Deleted {} objects", keys.len());
        Ok(())
    }

    /// Check whether an object exists
    ///
    /// Only a not-found response yields `false`; every other failure is
    /// returned to the caller.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn object_exists(&self, key: &str) -> StorageResult<bool> {
        match self.backend.head_object(&self.bucket, key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetch object metadata without the body
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn metadata(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.backend.head_object(&self.bucket, key).await
    }

    /// Issue a GET URL valid for `expires_in_secs` seconds from now
    pub async fn presigned_url(&self, key: &str, expires_in_secs: u64) -> StorageResult<PresignedUrl> {
        self.presigned_url_at(key, Duration::from_secs(expires_in_secs), SystemTime::now())
            .await
    }

    /// Issue a GET URL signed as of `start_time`
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn presigned_url_at(
        &self,
        key: &str,
        expires_in: Duration,
        start_time: SystemTime,
    ) -> StorageResult<PresignedUrl> {
        let secs = expires_in.as_secs();
        if secs == 0 || secs > MAX_PRESIGN_EXPIRY_SECS {
            return Err(StorageError::InvalidRequest(format!(
                "presigned URL expiry must be between 1 and {} seconds, got {}",
                MAX_PRESIGN_EXPIRY_SECS, secs
            )));
        }

        self.backend
            .presign_get(&self.bucket, key, expires_in, start_time)
            .await
    }
}

/// Report `keys` as failed with the error that stopped the batch run
fn undeleted(keys: &[String], err: &StorageError) -> Vec<DeleteFailure> {
    let (code, message) = match err {
        StorageError::Remote { code, message, .. } => (code.clone(), message.clone()),
        other => ("NotAttempted".to_string(), other.to_string()),
    };

    keys.iter()
        .map(|key| DeleteFailure {
            key: key.clone(),
            code: code.clone(),
            message: message.clone(),
        })
        .collect()
}
