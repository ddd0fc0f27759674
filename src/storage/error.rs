//! Storage error taxonomy
//!
//! Provider errors are classified once, at the backend boundary, into a small
//! closed set of kinds. Callers branch on [`ErrorKind`] instead of comparing
//! provider error codes.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Classification of a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    Throttled,
    Other,
}

impl ErrorKind {
    /// Classify a provider error from its code and HTTP status
    ///
    /// The error code wins when present. HEAD responses carry no body, so
    /// for those only the status is available.
    pub fn classify(code: Option<&str>, status: Option<u16>) -> Self {
        match code {
            Some("NoSuchKey" | "NotFound" | "NoSuchVersion") => ErrorKind::NotFound,
            Some(
                "AccessDenied"
                | "Forbidden"
                | "InvalidAccessKeyId"
                | "SignatureDoesNotMatch"
                | "ExpiredToken"
                | "InvalidToken"
                | "AllAccessDisabled"
                | "AccountProblem",
            ) => ErrorKind::AccessDenied,
            Some(
                "SlowDown"
                | "Throttling"
                | "ThrottlingException"
                | "RequestLimitExceeded"
                | "RequestThrottled"
                | "TooManyRequests"
                | "TooManyRequestsException",
            ) => ErrorKind::Throttled,
            // A missing bucket is a configuration problem, not a missing object
            Some("NoSuchBucket") => ErrorKind::Other,
            _ => match status {
                Some(404) => ErrorKind::NotFound,
                Some(401 | 403) => ErrorKind::AccessDenied,
                Some(429) => ErrorKind::Throttled,
                _ => ErrorKind::Other,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AccessDenied => "access denied",
            ErrorKind::Throttled => "throttled",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key the service refused to delete in a batch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Errors that can occur during object storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{operation} failed ({kind}): {code}: {message}")]
    Remote {
        kind: ErrorKind,
        operation: &'static str,
        code: String,
        message: String,
    },

    #[error("Local I/O error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Batch delete failed for {} key(s)", failures.len())]
    PartialDelete { failures: Vec<DeleteFailure> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn remote(
        kind: ErrorKind,
        operation: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StorageError::Remote {
            kind,
            operation,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn local_io(path: &Path, source: std::io::Error) -> Self {
        StorageError::LocalIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Kind of the remote failure, if this error came from the service
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            StorageError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_code() {
        assert_eq!(ErrorKind::classify(Some("NoSuchKey"), Some(404)), ErrorKind::NotFound);
        assert_eq!(ErrorKind::classify(Some("NotFound"), None), ErrorKind::NotFound);
        assert_eq!(ErrorKind::classify(Some("AccessDenied"), Some(403)), ErrorKind::AccessDenied);
        assert_eq!(ErrorKind::classify(Some("ExpiredToken"), Some(400)), ErrorKind::AccessDenied);
        assert_eq!(ErrorKind::classify(Some("SlowDown"), Some(503)), ErrorKind::Throttled);
        assert_eq!(ErrorKind::classify(Some("InternalError"), Some(500)), ErrorKind::Other);
    }

    #[test]
    fn test_classify_by_status() {
        assert_eq!(ErrorKind::classify(None, Some(404)), ErrorKind::NotFound);
        assert_eq!(ErrorKind::classify(None, Some(403)), ErrorKind::AccessDenied);
        assert_eq!(ErrorKind::classify(None, Some(429)), ErrorKind::Throttled);
        assert_eq!(ErrorKind::classify(None, Some(500)), ErrorKind::Other);
        assert_eq!(ErrorKind::classify(None, None), ErrorKind::Other);
    }

    #[test]
    fn test_missing_bucket_is_not_a_missing_object() {
        assert_eq!(ErrorKind::classify(Some("NoSuchBucket"), Some(404)), ErrorKind::Other);
    }

    #[test]
    fn test_error_helpers() {
        let err = StorageError::remote(ErrorKind::NotFound, "GetObject", "NoSuchKey", "gone");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "GetObject failed (not found): NoSuchKey: gone");

        let io = StorageError::local_io(
            Path::new("/missing/file.txt"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(io.kind(), None);
        assert!(!io.is_not_found());
        assert!(io.to_string().starts_with("Local I/O error on /missing/file.txt"));
    }
}
