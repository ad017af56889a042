//! The transition manager façade.

use crate::attempt::{AttemptLog, AttemptOutcome, GuardOutcome, TransitionAttempt};
use crate::error::{EngineError, EngineResult};
use crate::intent;
use docsync_fsm::{DocumentState, LifecycleEvent, TransitionTable};
use docsync_remote::{DocRef, FileRef, RemoteIndex};
use docsync_store::{
    now_millis, DocumentId, DocumentRecord, LockRegistry, OrphanRecord, RecordChanges,
    StateStore,
};
use std::sync::Arc;
use tracing::debug;

/// Applies lifecycle events to documents.
///
/// For every event: acquire the per-document lock, read the current
/// `(state, version)`, consult the transition table, then either perform
/// the single CAS write (simple events) or run the write-ahead intent
/// protocol (multi-step events). The lock releases on every path. Every
/// attempt (success, FSM rejection, or commit conflict) is appended to
/// the structured attempt log.
pub struct TransitionManager<R> {
    store: Arc<StateStore>,
    locks: Arc<LockRegistry>,
    remote: Arc<R>,
    table: TransitionTable,
    attempts: AttemptLog,
}

impl<R: RemoteIndex> TransitionManager<R> {
    /// Creates a manager over the given store, lock registry, and remote.
    pub fn new(
        store: Arc<StateStore>,
        locks: Arc<LockRegistry>,
        remote: Arc<R>,
        attempts: AttemptLog,
    ) -> Self {
        Self {
            store,
            locks,
            remote,
            table: TransitionTable::new(),
            attempts,
        }
    }

    /// The underlying state store.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// The per-document lock registry.
    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    /// The structured attempt log.
    pub fn attempts(&self) -> &AttemptLog {
        &self.attempts
    }

    /// Registers a newly observed document as `Untracked` at version 0.
    pub async fn create(&self, id: &DocumentId) -> EngineResult<DocumentRecord> {
        let _guard = self.locks.acquire(id).await;
        let record = DocumentRecord::untracked(id.clone());
        self.store.insert(record.clone())?;
        debug!(doc = %id, "document registered");
        Ok(record)
    }

    /// Fires `event` on the document, with no extra column changes.
    pub async fn apply(
        &self,
        id: &DocumentId,
        event: LifecycleEvent,
    ) -> EngineResult<DocumentState> {
        self.apply_with(id, event, RecordChanges::none()).await
    }

    /// Fires `event` on the document, applying `changes` with the
    /// committed write.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotAllowed`] if the FSM rejects the event
    ///   (nothing is written)
    /// - [`EngineError::Stale`] if another transition claimed the version
    /// - [`EngineError::Remote`] if a multi-step event's remote side
    ///   effect failed (the intent marker stays for recovery)
    pub async fn apply_with(
        &self,
        id: &DocumentId,
        event: LifecycleEvent,
        changes: RecordChanges,
    ) -> EngineResult<DocumentState> {
        self.apply_inner(id, event, changes, None).await
    }

    /// Fires `event` pinned to a version the caller read earlier.
    ///
    /// If the record has moved past `expected_version`, the attempt
    /// fails with [`EngineError::Stale`]: the caller's decision was
    /// based on a state that no longer exists, and the caller decides
    /// what that means. With N concurrent pinned attempts on the same
    /// version, exactly one commits.
    pub async fn apply_pinned(
        &self,
        id: &DocumentId,
        event: LifecycleEvent,
        expected_version: u64,
    ) -> EngineResult<DocumentState> {
        self.apply_inner(id, event, RecordChanges::none(), Some(expected_version))
            .await
    }

    async fn apply_inner(
        &self,
        id: &DocumentId,
        event: LifecycleEvent,
        changes: RecordChanges,
        pinned_version: Option<u64>,
    ) -> EngineResult<DocumentState> {
        let _guard = self.locks.acquire(id).await;

        let Some(record) = self.store.get(id) else {
            let err = EngineError::NotFound(id.clone());
            self.attempts.record(TransitionAttempt::new(
                id.clone(),
                None,
                None,
                event,
                AttemptOutcome::Failed,
                None,
                Some(err.to_string()),
            ));
            return Err(err);
        };
        let from = record.state;

        // A pinned attempt is decided by version alone: the version
        // uniquely identifies the state the caller saw, so a mismatch is
        // a lost race before any FSM question arises.
        if let Some(expected_version) = pinned_version {
            if record.version != expected_version {
                let err = EngineError::Stale {
                    id: id.clone(),
                    expected_version,
                };
                self.attempts.record(TransitionAttempt::new(
                    id.clone(),
                    Some(from),
                    None,
                    event,
                    AttemptOutcome::Failed,
                    Some(GuardOutcome::Conflict),
                    Some(err.to_string()),
                ));
                return Err(err);
            }
        }

        let to = match self.table.fire(from, event) {
            Ok(to) => to,
            Err(fsm_err) => {
                self.attempts.record(TransitionAttempt::new(
                    id.clone(),
                    Some(from),
                    None,
                    event,
                    AttemptOutcome::Rejected,
                    None,
                    Some(fsm_err.to_string()),
                ));
                return Err(EngineError::NotAllowed { from, event });
            }
        };

        let result = if event.is_multi_step() {
            intent::run_reset(self.store.as_ref(), self.remote.as_ref(), &record).await
        } else {
            self.commit_simple(&record, event, to, changes)
        };

        let (outcome, guard, error) = match &result {
            Ok(_) => (AttemptOutcome::Success, Some(GuardOutcome::Passed), None),
            Err(err @ EngineError::Stale { .. }) => (
                AttemptOutcome::Failed,
                Some(GuardOutcome::Conflict),
                Some(err.to_string()),
            ),
            Err(err) => (AttemptOutcome::Failed, None, Some(err.to_string())),
        };
        self.attempts.record(TransitionAttempt::new(
            id.clone(),
            Some(from),
            result.as_ref().ok().copied(),
            event,
            outcome,
            guard,
            error,
        ));

        result
    }

    /// Commits a single-CAS transition.
    fn commit_simple(
        &self,
        record: &DocumentRecord,
        event: LifecycleEvent,
        to: DocumentState,
        changes: RecordChanges,
    ) -> EngineResult<DocumentState> {
        let changes = match event {
            // Leaving the remote-resource states clears the identifiers;
            // failure paths first park them as orphans so the sweep can
            // delete them remotely.
            LifecycleEvent::Fail | LifecycleEvent::FailReset => {
                if let Some(file) = record.remote_file_id.clone() {
                    self.store.add_orphan(OrphanRecord {
                        doc_id: record.id.clone(),
                        remote_file_id: file,
                        remote_store_doc_id: record.remote_store_doc_id.clone(),
                        recorded_at: now_millis(),
                    })?;
                }
                changes.clear_remote()
            }
            LifecycleEvent::Retry => changes.clear_remote(),
            _ => changes,
        };

        if self
            .store
            .cas_transition(&record.id, record.state, record.version, to, &changes)?
        {
            Ok(to)
        } else {
            Err(EngineError::Stale {
                id: record.id.clone(),
                expected_version: record.version,
            })
        }
    }

    /// Swaps an indexed document's remote identifiers to a new version.
    ///
    /// The guarded edge of upload-first replacement: conditioned on the
    /// record still being `Indexed` at `expected_version`. A miss means
    /// another transition won the race and surfaces as
    /// [`EngineError::Guard`], handled by callers like a stale
    /// transition. The state does not change; the version bumps by 1 so
    /// concurrent transitions holding the old version lose.
    pub async fn replace_indexed_refs(
        &self,
        id: &DocumentId,
        expected_version: u64,
        file: &FileRef,
        doc: &DocRef,
        digest: &str,
    ) -> EngineResult<()> {
        let _guard = self.locks.acquire(id).await;
        let record = self
            .store
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.clone()))?;

        if record.state != DocumentState::Indexed {
            return Err(EngineError::Guard {
                id: id.clone(),
                reason: format!("expected indexed, found {}", record.state),
            });
        }

        let changes = RecordChanges::none()
            .remote_file_id(Some(file.as_str().to_string()))
            .remote_store_doc_id(Some(doc.as_str().to_string()))
            .content_digest(Some(digest.to_string()));

        if self.store.cas_transition(
            id,
            DocumentState::Indexed,
            expected_version,
            DocumentState::Indexed,
            &changes,
        )? {
            debug!(doc = %id, "remote identifiers replaced");
            Ok(())
        } else {
            Err(EngineError::Guard {
                id: id.clone(),
                reason: "replacement lost the version race".into(),
            })
        }
    }
}
