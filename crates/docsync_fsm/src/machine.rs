//! Lifecycle states, events, and the transition table.

use crate::error::{FsmError, FsmResult};
use serde::{Deserialize, Serialize};

/// The lifecycle state of a tracked document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentState {
    /// Known locally, nothing exists remotely.
    Untracked,
    /// Raw content is being uploaded to the remote service.
    Uploading,
    /// Uploaded; the remote service is processing the file.
    Processing,
    /// Fully indexed and searchable remotely.
    Indexed,
    /// A transition failed; the failure is recorded as data.
    Failed,
}

impl DocumentState {
    /// Returns true if the document has (or may have) remote resources.
    ///
    /// Remote identifiers are only ever non-null in these states.
    #[must_use]
    pub fn has_remote_resources(&self) -> bool {
        matches!(self, DocumentState::Processing | DocumentState::Indexed)
    }

    /// Returns true if the document is mid-pipeline toward `Indexed`.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DocumentState::Uploading | DocumentState::Processing)
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DocumentState::Untracked => "untracked",
            DocumentState::Uploading => "uploading",
            DocumentState::Processing => "processing",
            DocumentState::Indexed => "indexed",
            DocumentState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An event that fires a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Begin uploading raw content.
    StartUpload,
    /// The upload finished and the remote file is active.
    CompleteUpload,
    /// The remote import finished; the document is searchable.
    CompleteProcessing,
    /// An in-flight step failed.
    Fail,
    /// Tear down remote resources and return to `Untracked`.
    ///
    /// This is the one multi-step event: it requires two remote deletes
    /// before the local finalizing write, driven by the write-ahead
    /// intent protocol rather than a single CAS.
    Reset,
    /// Escape hatch from `Failed` back to `Untracked`.
    Retry,
    /// Mark an indexed document as failed without touching the remote.
    FailReset,
}

impl LifecycleEvent {
    /// Returns true if this event requires the write-ahead intent
    /// protocol (remote side effects between two local transactions).
    #[must_use]
    pub fn is_multi_step(&self) -> bool {
        matches!(self, LifecycleEvent::Reset)
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleEvent::StartUpload => "start_upload",
            LifecycleEvent::CompleteUpload => "complete_upload",
            LifecycleEvent::CompleteProcessing => "complete_processing",
            LifecycleEvent::Fail => "fail",
            LifecycleEvent::Reset => "reset",
            LifecycleEvent::Retry => "retry",
            LifecycleEvent::FailReset => "fail_reset",
        };
        f.write_str(name)
    }
}

/// The fixed transition table.
///
/// A zero-sized lookup: state is threaded explicitly through each call and
/// the answer depends on nothing else. The legal edge set is:
///
/// | From       | Event              | To        |
/// |------------|--------------------|-----------|
/// | Untracked  | StartUpload        | Uploading |
/// | Uploading  | CompleteUpload     | Processing|
/// | Processing | CompleteProcessing | Indexed   |
/// | Uploading  | Fail               | Failed    |
/// | Processing | Fail               | Failed    |
/// | Indexed    | Reset              | Untracked |
/// | Failed     | Retry              | Untracked |
/// | Indexed    | FailReset          | Failed    |
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionTable;

impl TransitionTable {
    /// Creates a transition table.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Looks up the target state for `(state, event)`, if the edge is legal.
    #[must_use]
    pub fn target(&self, state: DocumentState, event: LifecycleEvent) -> Option<DocumentState> {
        use DocumentState::*;
        use LifecycleEvent::*;

        match (state, event) {
            (Untracked, StartUpload) => Some(Uploading),
            (Uploading, CompleteUpload) => Some(Processing),
            (Processing, CompleteProcessing) => Some(Indexed),
            (Uploading, Fail) | (Processing, Fail) => Some(Failed),
            (Indexed, Reset) => Some(Untracked),
            (Failed, Retry) => Some(Untracked),
            (Indexed, FailReset) => Some(Failed),
            _ => None,
        }
    }

    /// Returns true if `event` is legal in `state`.
    #[must_use]
    pub fn can_fire(&self, state: DocumentState, event: LifecycleEvent) -> bool {
        self.target(state, event).is_some()
    }

    /// Fires `event` from `state`, returning the target state.
    ///
    /// # Errors
    ///
    /// Returns [`FsmError::NotAllowed`] if the edge is not in the table.
    pub fn fire(
        &self,
        state: DocumentState,
        event: LifecycleEvent,
    ) -> FsmResult<DocumentState> {
        self.target(state, event)
            .ok_or(FsmError::NotAllowed { from: state, event })
    }
}

/// All states, for exhaustive table walks in tests and diagnostics.
pub const ALL_STATES: [DocumentState; 5] = [
    DocumentState::Untracked,
    DocumentState::Uploading,
    DocumentState::Processing,
    DocumentState::Indexed,
    DocumentState::Failed,
];

/// All events, for exhaustive table walks in tests and diagnostics.
pub const ALL_EVENTS: [LifecycleEvent; 7] = [
    LifecycleEvent::StartUpload,
    LifecycleEvent::CompleteUpload,
    LifecycleEvent::CompleteProcessing,
    LifecycleEvent::Fail,
    LifecycleEvent::Reset,
    LifecycleEvent::Retry,
    LifecycleEvent::FailReset,
];
