//! Error types for the state store.

use crate::record::DocumentId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the state store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An I/O error from the journal file.
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The journal header is not recognized.
    #[error("corrupt journal: {0}")]
    Corrupt(String),

    /// The writer lock could not be acquired within the bounded backoff.
    ///
    /// This signals a wedged writer, not a logical conflict; logical CAS
    /// mismatches are reported through `Ok(false)` return values.
    #[error("store writer is busy")]
    Busy,

    /// Another process holds the store directory lock.
    #[error("store directory {0:?} is locked by another process")]
    Locked(PathBuf),

    /// The document id is already tracked.
    #[error("document {0} is already tracked")]
    AlreadyTracked(DocumentId),

    /// No record exists for the document id.
    #[error("document {0} not found")]
    NotFound(DocumentId),

    /// A progress write arrived for a document with no pending intent.
    #[error("document {0} has no pending intent")]
    IntentMissing(DocumentId),
}

impl StoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Creates a corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }

    /// Returns true if retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy)
    }
}
