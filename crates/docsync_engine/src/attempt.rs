//! Structured transition attempt log.
//!
//! One entry per transition attempt: success, FSM rejection, or commit
//! failure. This log is the sole externally observable evidence of
//! ordering under concurrent contention; operators and tests consume it
//! to reconstruct who won which version.

use docsync_fsm::{DocumentState, LifecycleEvent};
use docsync_store::{now_millis, DocumentId};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// How a transition attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptOutcome {
    /// The transition committed.
    Success,
    /// The FSM rejected the event; nothing was written.
    Rejected,
    /// The attempt failed at or after the commit point (CAS conflict,
    /// remote failure, store failure).
    Failed,
}

/// The commit-time guard verdict, when the attempt got that far.
///
/// The guard and the write are one CAS statement, so this is simply
/// whether that statement matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GuardOutcome {
    /// The expected state and version matched; the write applied.
    Passed,
    /// Another writer claimed the version first.
    Conflict,
}

/// One recorded transition attempt.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionAttempt {
    /// Unique id of this attempt.
    pub attempt_id: Uuid,
    /// Document the event targeted.
    pub doc_id: DocumentId,
    /// State the document was in when the attempt started.
    pub from_state: Option<DocumentState>,
    /// Target state, when the FSM allowed the event.
    pub to_state: Option<DocumentState>,
    /// The event that was fired.
    pub event: LifecycleEvent,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// Commit-time guard verdict, if the attempt reached the write.
    pub guard: Option<GuardOutcome>,
    /// Error message for rejected/failed attempts.
    pub error: Option<String>,
    /// When the attempt was recorded (unix millis).
    pub timestamp_ms: u64,
}

impl TransitionAttempt {
    /// Creates an attempt record stamped with a fresh id and the current
    /// time.
    #[must_use]
    pub fn new(
        doc_id: DocumentId,
        from_state: Option<DocumentState>,
        to_state: Option<DocumentState>,
        event: LifecycleEvent,
        outcome: AttemptOutcome,
        guard: Option<GuardOutcome>,
        error: Option<String>,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            doc_id,
            from_state,
            to_state,
            event,
            outcome,
            guard,
            error,
            timestamp_ms: now_millis(),
        }
    }
}

/// Bounded in-memory log of transition attempts.
///
/// Cheap to clone; clones share the same buffer. The oldest entries are
/// dropped once the capacity is reached.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    entries: Arc<RwLock<VecDeque<TransitionAttempt>>>,
    capacity: usize,
}

impl AttemptLog {
    /// Creates a log retaining at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Appends one attempt.
    pub fn record(&self, attempt: TransitionAttempt) {
        debug!(
            doc = %attempt.doc_id,
            event = %attempt.event,
            outcome = ?attempt.outcome,
            error = attempt.error.as_deref(),
            "transition attempt"
        );
        let mut entries = self.entries.write();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(attempt);
    }

    /// All retained attempts, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TransitionAttempt> {
        self.entries.read().iter().cloned().collect()
    }

    /// Retained attempts for one document, oldest first.
    #[must_use]
    pub fn for_document(&self, doc_id: &DocumentId) -> Vec<TransitionAttempt> {
        self.entries
            .read()
            .iter()
            .filter(|attempt| &attempt.doc_id == doc_id)
            .cloned()
            .collect()
    }

    /// Number of retained attempts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for AttemptLog {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(doc: &str, outcome: AttemptOutcome) -> TransitionAttempt {
        TransitionAttempt::new(
            DocumentId::new(doc),
            Some(DocumentState::Untracked),
            Some(DocumentState::Uploading),
            LifecycleEvent::StartUpload,
            outcome,
            Some(GuardOutcome::Passed),
            None,
        )
    }

    #[test]
    fn records_in_order() {
        let log = AttemptLog::new(10);
        log.record(attempt("doc-1", AttemptOutcome::Success));
        log.record(attempt("doc-2", AttemptOutcome::Failed));

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].doc_id, DocumentId::new("doc-1"));
        assert_eq!(entries[1].outcome, AttemptOutcome::Failed);
    }

    #[test]
    fn capacity_drops_oldest() {
        let log = AttemptLog::new(2);
        log.record(attempt("doc-1", AttemptOutcome::Success));
        log.record(attempt("doc-2", AttemptOutcome::Success));
        log.record(attempt("doc-3", AttemptOutcome::Success));

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].doc_id, DocumentId::new("doc-2"));
    }

    #[test]
    fn filter_by_document() {
        let log = AttemptLog::new(10);
        log.record(attempt("doc-1", AttemptOutcome::Success));
        log.record(attempt("doc-2", AttemptOutcome::Success));
        log.record(attempt("doc-1", AttemptOutcome::Failed));

        let entries = log.for_document(&DocumentId::new("doc-1"));
        assert_eq!(entries.len(), 2);
    }
}
