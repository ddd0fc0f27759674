//! Object storage
//!
//! [`S3Service`] is the bucket-scoped wrapper callers use. It talks to an
//! [`ObjectBackend`]: [`S3Backend`] for Amazon S3 and S3-compatible stores,
//! or [`MemoryBackend`] for tests and local development.

mod backend;
mod error;
mod memory;
mod s3;
mod service;

pub use backend::{ListPage, ObjectBackend, ObjectMeta, PresignedUrl};
pub use error::{DeleteFailure, ErrorKind, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use s3::S3Backend;
pub use service::{
    S3Service, StaticCredentials, DEFAULT_PRESIGN_EXPIRY_SECS, MAX_DELETE_BATCH,
    MAX_PRESIGN_EXPIRY_SECS,
};
