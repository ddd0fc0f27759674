//! Provider boundary for object storage
//!
//! Each method maps to exactly one remote request. Implementations translate
//! provider failures into [`StorageError`] before returning.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::error::{DeleteFailure, StorageResult};

/// Object metadata returned by a HEAD request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// A time-limited URL granting access to one object
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    pub url: String,
    pub method: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMeta>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Delete up to the service's per-request maximum in one call
    ///
    /// Keys the service refused are returned rather than raised.
    async fn delete_objects(&self, bucket: &str, keys: &[String])
        -> StorageResult<Vec<DeleteFailure>>;

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> StorageResult<ListPage>;

    /// Sign a GET request locally; no request is sent
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        start_time: SystemTime,
    ) -> StorageResult<PresignedUrl>;
}
