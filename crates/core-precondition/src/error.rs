//! Error type for precondition evaluation

use thiserror::Error;

/// Why an operation must not proceed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// The destination exists and the caller asked for create-only semantics
    #[error("destination already exists")]
    AlreadyExists,

    /// An ETag/version/unmodified-since condition did not hold
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A freshness condition held, so there is no body to return
    #[error("not modified: {0}")]
    NotModified(String),

    /// The backend lacks the atomic primitive this request needs
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// `Update` mode requested without an ETag or a version
    #[error("update mode requires an e_tag or a version")]
    EmptyUpdateVersion,
}
