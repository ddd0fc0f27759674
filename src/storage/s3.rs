//! Amazon S3 backend built on aws-sdk-s3
//!
//! The only place SDK error types are inspected. Every failure leaves this
//! module as a classified [`StorageError`].

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_sdk_s3::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{Delete, ObjectIdentifier},
    Client as S3Client,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::backend::{ListPage, ObjectBackend, ObjectMeta, PresignedUrl};
use super::error::{DeleteFailure, ErrorKind, StorageError, StorageResult};

/// S3 backend over a shared SDK client
#[derive(Clone, Debug)]
pub struct S3Backend {
    client: Arc<S3Client>,
}

impl S3Backend {
    pub fn new(client: Arc<S3Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let result = self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("PutObject", e))?;

        debug!(etag = ?result.e_tag(), "PutObject completed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let result = self.client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("GetObject", e))?;

        let data = result.body
            .collect()
            .await
            .map_err(|e| {
                StorageError::remote(ErrorKind::Other, "GetObject", "BodyReadError", e.to_string())
            })?
            .into_bytes();

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMeta> {
        let result = self.client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("HeadObject", e))?;

        Ok(ObjectMeta {
            key: key.to_string(),
            size: result.content_length().unwrap_or(0).max(0) as u64,
            content_type: result.content_type().map(String::from),
            etag: result.e_tag().map(String::from),
        })
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteObject", e))?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> StorageResult<Vec<DeleteFailure>> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::InvalidRequest(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::InvalidRequest(e.to_string()))?;

        let result = self.client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteObjects", e))?;

        // Quiet mode only reports the keys that failed
        let failures = result
            .errors()
            .iter()
            .map(|err| DeleteFailure {
                key: err.key().unwrap_or_default().to_string(),
                code: err.code().unwrap_or("Unknown").to_string(),
                message: err.message().unwrap_or_default().to_string(),
            })
            .collect();

        Ok(failures)
    }

    #[instrument(skip(self))]
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> StorageResult<ListPage> {
        let result = self.client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| sdk_error("ListObjectsV2", e))?;

        let keys = result
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| object.key)
            .collect();

        let next_token = if result.is_truncated.unwrap_or(false) {
            result.next_continuation_token
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }

    #[instrument(skip(self))]
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        start_time: SystemTime,
    ) -> StorageResult<PresignedUrl> {
        let config = PresigningConfig::builder()
            .start_time(start_time)
            .expires_in(expires_in)
            .build()
            .map_err(|e| StorageError::InvalidRequest(e.to_string()))?;

        let request = self.client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| sdk_error("GetObject", e))?;

        Ok(PresignedUrl {
            url: request.uri().to_string(),
            method: request.method().to_string(),
            expires_at: DateTime::<Utc>::from(start_time + expires_in),
        })
    }
}

/// Translate an SDK error into a classified storage error
fn sdk_error<E>(operation: &'static str, err: SdkError<E>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    let kind = ErrorKind::classify(err.code(), status);

    let code = match (err.code(), status) {
        (Some(code), _) => code.to_string(),
        (None, Some(status)) => status.to_string(),
        (None, None) => "Unknown".to_string(),
    };
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    debug!(operation, %kind, %code, "Storage request failed");
    StorageError::remote(kind, operation, code, message)
}
