//! Error types for the lifecycle state machine.

use crate::machine::{DocumentState, LifecycleEvent};
use thiserror::Error;

/// Result type for transition table lookups.
pub type FsmResult<T> = Result<T, FsmError>;

/// Errors produced by the transition table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    /// The event is not legal in the current state.
    ///
    /// This always indicates an ordering bug in the caller; the table
    /// never mutates anything, so the entity is untouched.
    #[error("event {event:?} is not allowed in state {from:?}")]
    NotAllowed {
        /// State the entity was in.
        from: DocumentState,
        /// Event that was attempted.
        event: LifecycleEvent,
    },
}
