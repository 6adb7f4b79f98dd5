/*!
 * Error types for storekit
 */

use std::io;
use storekit_core_precondition::PreconditionError;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Unified error type for store and engine operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed or unsatisfiable byte range
    #[error("Invalid range for {path}: {reason}")]
    InvalidRange { path: String, reason: String },

    /// ETag, version or unmodified-since condition did not hold
    #[error("Precondition failed for {path}: {reason}")]
    PreconditionFailed { path: String, reason: String },

    /// Freshness condition held; there is no body to return
    #[error("Not modified: {path}: {reason}")]
    NotModified { path: String, reason: String },

    /// Create or overwrite=false against an existing object
    #[error("Object already exists: {path}")]
    AlreadyExists { path: String },

    /// Backend lacks a required atomic primitive
    #[error("Operation '{operation}' not supported by backend {backend}")]
    NotSupported { backend: String, operation: String },

    /// Multipart session abandoned
    #[error("Multipart upload {upload_id} for {path} aborted: {reason}")]
    Aborted {
        path: String,
        upload_id: String,
        reason: String,
    },

    /// Object does not exist
    #[error("Object not found on {backend}: {path}")]
    NotFound { path: String, backend: String },

    /// Opaque passthrough from the backend adapter
    #[error("Backend error on {backend} ({code}): {message}")]
    Backend {
        backend: String,
        code: String,
        message: String,
    },

    /// Invalid configuration or call arguments
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid use of a consumable handle
    #[error("Usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Primary failure whose best-effort cleanup also failed
    #[error("{primary} (cleanup also failed: {cleanup})")]
    WithCleanupFailure {
        primary: Box<StoreError>,
        cleanup: Box<StoreError>,
    },
}

impl StoreError {
    /// Build a backend passthrough error
    pub fn backend(
        backend: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StoreError::Backend {
            backend: backend.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Map a policy verdict onto the store taxonomy for `path`
    pub fn from_precondition(err: PreconditionError, path: &str, backend: &str) -> Self {
        let path = path.to_string();
        match err {
            PreconditionError::AlreadyExists => StoreError::AlreadyExists { path },
            PreconditionError::PreconditionFailed(reason) => {
                StoreError::PreconditionFailed { path, reason }
            }
            PreconditionError::NotModified(reason) => StoreError::NotModified { path, reason },
            PreconditionError::NotSupported(operation) => StoreError::NotSupported {
                backend: backend.to_string(),
                operation,
            },
            PreconditionError::EmptyUpdateVersion => StoreError::InvalidConfig(format!(
                "update of {} requires an e_tag or a version",
                path
            )),
        }
    }

    /// Attach a failed cleanup to this error without replacing it
    pub fn with_cleanup_failure(self, cleanup: StoreError) -> Self {
        StoreError::WithCleanupFailure {
            primary: Box::new(self),
            cleanup: Box::new(cleanup),
        }
    }

    /// The failure that caused the operation to stop
    pub fn primary(&self) -> &StoreError {
        match self {
            StoreError::WithCleanupFailure { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// The secondary cleanup failure, if any
    pub fn cleanup_failure(&self) -> Option<&StoreError> {
        match self {
            StoreError::WithCleanupFailure { cleanup, .. } => Some(cleanup),
            _ => None,
        }
    }

    /// Check if this error indicates the object was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self.primary(), StoreError::NotFound { .. })
    }

    /// Check if this error is retriable (transient)
    ///
    /// The engines never retry; this is advice for callers.
    pub fn is_retryable(&self) -> bool {
        match self.primary() {
            StoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            StoreError::Backend { code, .. } => matches!(
                code.as_str(),
                "SlowDown" | "RequestTimeout" | "InternalError" | "ServiceUnavailable"
            ),
            _ => false,
        }
    }

    /// Short machine readable code for this error
    pub fn code(&self) -> &str {
        match self.primary() {
            StoreError::InvalidRange { .. } => "InvalidRange",
            StoreError::PreconditionFailed { .. } => "PreconditionFailed",
            StoreError::NotModified { .. } => "NotModified",
            StoreError::AlreadyExists { .. } => "AlreadyExists",
            StoreError::NotSupported { .. } => "NotSupported",
            StoreError::Aborted { .. } => "Aborted",
            StoreError::NotFound { .. } => "NotFound",
            StoreError::Backend { code, .. } => code,
            StoreError::InvalidConfig(_) => "InvalidConfig",
            StoreError::Usage(_) => "Usage",
            StoreError::Io(_) => "Io",
            StoreError::WithCleanupFailure { .. } => "WithCleanupFailure",
        }
    }
}
