//! The write-ahead intent protocol.
//!
//! The reset transition (Indexed → Untracked) must delete the indexed
//! document remotely, delete the raw uploaded file remotely, then clear
//! the local remote references and flip the state. The two remote calls
//! are uncancellable side effects, so the protocol records a durable
//! intent before the first one and a progress counter after each:
//!
//! 1. Txn A: CAS on (state, version) writes the intent marker; state
//!    and version are unchanged. A CAS miss means another transition
//!    claimed this version: report stale, no side effects attempted.
//! 2. Idempotent delete of the indexed document, then progress = 1.
//! 3. Idempotent delete of the raw file, then progress = 2.
//! 4. Txn B: CAS on (version, intent kind) flips to Untracked, clears
//!    refs and intent, bumps the version.
//!
//! A crash, timeout, or cancellation anywhere between 1 and 4 leaves the
//! intent marker in place; the recovery crawler later resumes exactly
//! the remaining steps. Idempotent deletes absorb the duplicate calls
//! that resumption can produce.

use crate::error::{EngineError, EngineResult};
use docsync_fsm::DocumentState;
use docsync_remote::{
    delete_file_idempotent, delete_index_doc_idempotent, DocRef, FileRef, RemoteIndex,
};
use docsync_store::{DocumentRecord, IntentKind, RecordChanges, StateStore};
use tracing::{debug, info};

/// Runs the full reset protocol from the front.
///
/// The caller must hold the per-document lock and pass the record it
/// read under that lock.
pub(crate) async fn run_reset<R>(
    store: &StateStore,
    remote: &R,
    record: &DocumentRecord,
) -> EngineResult<DocumentState>
where
    R: RemoteIndex + ?Sized,
{
    let id = &record.id;

    // Txn A: claim the version by recording the intent.
    if !store.cas_put_intent(id, DocumentState::Indexed, record.version, IntentKind::Reset)? {
        return Err(EngineError::Stale {
            id: id.clone(),
            expected_version: record.version,
        });
    }
    debug!(doc = %id, version = record.version, "reset intent recorded");

    let claimed = store
        .get(id)
        .ok_or_else(|| EngineError::NotFound(id.clone()))?;
    resume_reset(store, remote, &claimed).await
}

/// Performs the remaining steps of a claimed reset.
///
/// Shared by the forward path (progress 0) and the recovery crawler
/// (any progress). The caller must hold the per-document lock; `record`
/// must carry the pending intent.
pub(crate) async fn resume_reset<R>(
    store: &StateStore,
    remote: &R,
    record: &DocumentRecord,
) -> EngineResult<DocumentState>
where
    R: RemoteIndex + ?Sized,
{
    let id = &record.id;
    let intent = record
        .intent
        .as_ref()
        .ok_or_else(|| EngineError::Guard {
            id: id.clone(),
            reason: "no pending intent to resume".into(),
        })?;
    let steps_done = intent.steps_completed;
    let version = record.version;

    if steps_done < 1 {
        let doc_ref = record.remote_store_doc_id.as_deref().map(DocRef::new);
        delete_index_doc_idempotent(remote, doc_ref.as_ref()).await?;
        store.advance_intent(id, 1)?;
    }

    if steps_done < 2 {
        let file_ref = record.remote_file_id.as_deref().map(FileRef::new);
        delete_file_idempotent(remote, file_ref.as_ref()).await?;
        store.advance_intent(id, 2)?;
    }

    // Txn B: finalize. With both remote steps durable, a miss here means
    // some other writer finalized (or the version moved); the intent is
    // either gone or still recoverable, so surfacing stale is safe.
    if !store.cas_finalize_intent(
        id,
        version,
        IntentKind::Reset,
        DocumentState::Untracked,
        &RecordChanges::none().clear_remote(),
    )? {
        return Err(EngineError::Stale {
            id: id.clone(),
            expected_version: version,
        });
    }

    info!(doc = %id, from_progress = steps_done, "reset finalized");
    Ok(DocumentState::Untracked)
}
