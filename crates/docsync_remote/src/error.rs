//! Error types for remote operations.

use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by the remote index service.
///
/// `NotFound` is the one absorbable failure: the idempotent delete
/// wrappers turn it into success. Everything else propagates unchanged
/// and is never downgraded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The addressed resource does not exist remotely.
    #[error("remote resource not found")]
    NotFound,

    /// The service or the admission gate pushed back; retry later.
    #[error("remote service rate limited")]
    RateLimited,

    /// The call timed out.
    #[error("remote call timed out")]
    Timeout,

    /// The service failed.
    #[error("remote service unavailable: {message}")]
    Unavailable {
        /// Error message from the service.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The service rejected the caller's credentials or permissions.
    #[error("remote access denied: {0}")]
    Denied(String),

    /// The service returned something the client cannot interpret.
    #[error("remote protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Creates a retryable unavailability error.
    pub fn unavailable_retryable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable unavailability error.
    pub fn unavailable_fatal(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the target was already absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound)
    }

    /// Returns true if retrying the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::RateLimited | RemoteError::Timeout => true,
            RemoteError::Unavailable { retryable, .. } => *retryable,
            RemoteError::NotFound | RemoteError::Denied(_) | RemoteError::Protocol(_) => false,
        }
    }
}
