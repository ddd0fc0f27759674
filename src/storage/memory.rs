//! In-memory implementation of the ObjectBackend trait.
//!
//! Behaves like S3 where the wrapper depends on it: paginated listings,
//! a per-request batch delete limit, and not-found codes for missing keys.
//! Suitable for tests and local development.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::RwLock;

use super::backend::{ListPage, ObjectBackend, ObjectMeta, PresignedUrl};
use super::error::{DeleteFailure, ErrorKind, StorageError, StorageResult};

/// Keys per listing page when not configured otherwise (matches S3)
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Most keys S3 accepts in one DeleteObjects request
const MAX_BATCH_DELETE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
}

/// An in-memory object store.
pub struct MemoryBackend {
    // (bucket, key) -> object
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
    page_size: usize,
    // operation names in the order they were received
    requests: Mutex<Vec<&'static str>>,
    // operation name -> kind of the next injected failure
    failures: Mutex<HashMap<&'static str, ErrorKind>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Split listings into pages of `page_size` keys
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Operations received so far, e.g. `["PutObject", "HeadObject"]`
    pub fn requests(&self) -> Vec<&'static str> {
        self.requests.lock().clone()
    }

    /// Number of requests received for one operation
    pub fn request_count(&self, operation: &str) -> usize {
        self.requests().into_iter().filter(|op| *op == operation).count()
    }

    /// Make the next call to `operation` fail with `kind`
    pub fn fail_next(&self, operation: &'static str, kind: ErrorKind) {
        self.failures.lock().insert(operation, kind);
    }

    fn record(&self, operation: &'static str) -> StorageResult<()> {
        self.requests.lock().push(operation);

        match self.failures.lock().remove(operation) {
            Some(kind) => Err(StorageError::remote(kind, operation, "Injected", "injected failure")),
            None => Ok(()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_key(bucket: &str, key: &str) -> (String, String) {
    (bucket.to_string(), key.to_string())
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        self.record("PutObject")?;
        let mut objects = self.objects.write().await;
        objects.insert(
            entry_key(bucket, key),
            StoredObject {
                data: body,
                content_type: content_type.map(String::from),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        self.record("GetObject")?;
        let objects = self.objects.read().await;
        objects
            .get(&entry_key(bucket, key))
            .map(|object| object.data.clone())
            .ok_or_else(|| {
                StorageError::remote(
                    ErrorKind::NotFound,
                    "GetObject",
                    "NoSuchKey",
                    "The specified key does not exist.",
                )
            })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMeta> {
        self.record("HeadObject")?;
        let objects = self.objects.read().await;
        let object = objects
            .get(&entry_key(bucket, key))
            .ok_or_else(|| StorageError::remote(ErrorKind::NotFound, "HeadObject", "NotFound", "Not Found"))?;

        Ok(ObjectMeta {
            key: key.to_string(),
            size: object.data.len() as u64,
            content_type: object.content_type.clone(),
            etag: None,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.record("DeleteObject")?;
        // S3 reports success for keys that do not exist
        self.objects.write().await.remove(&entry_key(bucket, key));
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> StorageResult<Vec<DeleteFailure>> {
        self.record("DeleteObjects")?;

        if keys.is_empty() || keys.len() > MAX_BATCH_DELETE {
            return Err(StorageError::remote(
                ErrorKind::Other,
                "DeleteObjects",
                "MalformedXML",
                format!("Delete request must contain 1 to {} keys", MAX_BATCH_DELETE),
            ));
        }

        let mut objects = self.objects.write().await;
        for key in keys {
            objects.remove(&entry_key(bucket, key));
        }
        Ok(Vec::new())
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> StorageResult<ListPage> {
        self.record("ListObjectsV2")?;
        let objects = self.objects.read().await;

        // The continuation token is the last key of the previous page
        let mut matching = objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k)
            .filter(|k| continuation.as_ref().map_or(true, |after| *k > after));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_token = match matching.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };

        Ok(ListPage { keys, next_token })
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        start_time: SystemTime,
    ) -> StorageResult<PresignedUrl> {
        self.record("PresignGetObject")?;
        let signed_at = DateTime::<Utc>::from(start_time);

        Ok(PresignedUrl {
            url: format!(
                "memory://{}/{}?X-Amz-Date={}&X-Amz-Expires={}",
                bucket,
                key,
                signed_at.format("%Y%m%dT%H%M%SZ"),
                expires_in.as_secs()
            ),
            method: "GET".to_string(),
            expires_at: signed_at + chrono::Duration::seconds(expires_in.as_secs() as i64),
        })
    }
}
