//! Error types for the engine.

use docsync_fsm::{DocumentState, LifecycleEvent};
use docsync_remote::RemoteError;
use docsync_store::{DocumentId, StoreError};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while driving transitions.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The CAS write found a different version than expected: another
    /// transition already claimed it. Never retried silently; the
    /// caller decides whether this was a lost race or a real conflict.
    #[error("stale transition on {id}: version {expected_version} was already claimed")]
    Stale {
        /// Document the transition targeted.
        id: DocumentId,
        /// Version the caller read before attempting the write.
        expected_version: u64,
    },

    /// The event is illegal in the document's current state. Always
    /// surfaced; indicates an ordering bug upstream. Nothing was written.
    #[error("event {event} is not allowed in state {from}")]
    NotAllowed {
        /// State the document was in.
        from: DocumentState,
        /// Event that was attempted.
        event: LifecycleEvent,
    },

    /// A precondition on a guarded edge failed at write time. Handled by
    /// callers exactly like [`EngineError::Stale`].
    #[error("guard rejected on {id}: {reason}")]
    Guard {
        /// Document the write targeted.
        id: DocumentId,
        /// Which precondition failed.
        reason: String,
    },

    /// No record exists for the document.
    #[error("document {0} is not tracked")]
    NotFound(DocumentId),

    /// A non-absorbable remote failure, propagated unchanged.
    #[error("remote operation failed: {0}")]
    Remote(#[from] RemoteError),

    /// A store failure.
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// The document source could not be scanned.
    #[error("document source error: {0}")]
    Source(String),
}

impl EngineError {
    /// Returns true for commit-time conflicts (stale or guard), which a
    /// caller may treat as "someone else won the race".
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Stale { .. } | EngineError::Guard { .. })
    }
}
