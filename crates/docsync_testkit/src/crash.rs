//! Crash-point helpers for the reset protocol.
//!
//! Each helper leaves a document exactly as a process crash at that
//! point would: intent recorded, some progress counted, nothing
//! finalized. Recovery tests then assert that the crawler performs
//! exactly the remaining steps.

use crate::fixtures::SyncHarness;
use docsync_fsm::{DocumentState, LifecycleEvent};
use docsync_remote::{RemoteError, RemoteIndex, RemoteOp};
use docsync_store::{DocumentId, IntentKind};

/// Where the reset protocol is interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Intent recorded, no remote call has succeeded yet.
    BeforeFirstDelete,
    /// The index document was deleted; the raw file was not.
    AfterFirstDelete,
    /// Both remote deletes succeeded; the finalizing write never ran.
    AfterBothDeletes,
}

impl CrashPoint {
    /// The `steps_completed` value the crash image must show.
    #[must_use]
    pub fn expected_progress(&self) -> u8 {
        match self {
            CrashPoint::BeforeFirstDelete => 0,
            CrashPoint::AfterFirstDelete => 1,
            CrashPoint::AfterBothDeletes => 2,
        }
    }
}

/// Interrupts a reset of the (indexed) document at the given point.
///
/// The first two points go through the real forward path with a scripted
/// remote failure, so the image is exactly what an operator would find.
/// `AfterBothDeletes` cannot be produced by a remote failure (the
/// remaining step is local), so it is staged through the store the way
/// the protocol itself writes it.
pub async fn induce_reset_crash(harness: &SyncHarness, id: &DocumentId, point: CrashPoint) {
    let record = harness.store.get(id).expect("document must exist");
    assert_eq!(
        record.state,
        DocumentState::Indexed,
        "reset crash points start from an indexed document"
    );

    match point {
        CrashPoint::BeforeFirstDelete => {
            harness
                .remote
                .fail_next(RemoteOp::DeleteIndexDoc, RemoteError::Timeout);
            let result = harness.manager.apply(id, LifecycleEvent::Reset).await;
            assert!(result.is_err(), "the scripted failure must interrupt reset");
        }
        CrashPoint::AfterFirstDelete => {
            harness
                .remote
                .fail_next(RemoteOp::DeleteFile, RemoteError::Timeout);
            let result = harness.manager.apply(id, LifecycleEvent::Reset).await;
            assert!(result.is_err(), "the scripted failure must interrupt reset");
        }
        CrashPoint::AfterBothDeletes => {
            let claimed = harness
                .store
                .cas_put_intent(id, DocumentState::Indexed, record.version, IntentKind::Reset)
                .expect("intent write failed");
            assert!(claimed, "intent claim must succeed on a quiet document");

            if let Some(doc) = record.remote_store_doc_id.as_deref() {
                harness
                    .remote
                    .delete_index_doc(&docsync_remote::DocRef::new(doc))
                    .await
                    .expect("index doc delete failed");
            }
            harness.store.advance_intent(id, 1).expect("progress write failed");

            if let Some(file) = record.remote_file_id.as_deref() {
                harness
                    .remote
                    .delete_file(&docsync_remote::FileRef::new(file))
                    .await
                    .expect("file delete failed");
            }
            harness.store.advance_intent(id, 2).expect("progress write failed");
        }
    }

    let image = harness.store.get(id).expect("document must exist");
    assert_eq!(image.state, DocumentState::Indexed);
    assert_eq!(image.version, record.version, "a crash never moves the version");
    assert_eq!(
        image
            .intent
            .as_ref()
            .expect("the intent must survive the crash")
            .steps_completed,
        point.expected_progress()
    );

    harness.remote.clear_calls();
}
