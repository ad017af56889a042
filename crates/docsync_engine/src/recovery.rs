//! Startup and periodic recovery of interrupted multi-step transitions.

use crate::error::EngineResult;
use crate::intent;
use docsync_remote::RemoteIndex;
use docsync_store::{DocumentId, DocumentRecord, LockRegistry, StateStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one recovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// Documents whose interrupted protocol was completed.
    pub resumed: Vec<DocumentId>,
    /// Documents whose resumption failed this pass, with the cause.
    pub failed: Vec<(DocumentId, String)>,
}

impl RecoveryReport {
    /// Returns true if nothing needed recovery.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.resumed.is_empty() && self.failed.is_empty()
    }
}

/// Scans for documents stuck mid-protocol and resumes them.
///
/// Recovery is deliberately simpler than the forward path: one attempt
/// per document per pass, no retry or backoff loops. A failure is logged
/// and the crawler proceeds to the next document; the next invocation
/// (process restart or periodic sweep) tries again. Idempotent deletes
/// absorb any duplicate remote calls resumption produces.
pub struct RecoveryCrawler<R> {
    store: Arc<StateStore>,
    locks: Arc<LockRegistry>,
    remote: Arc<R>,
}

impl<R: RemoteIndex> RecoveryCrawler<R> {
    /// Creates a crawler over the given store, lock registry, and remote.
    pub fn new(store: Arc<StateStore>, locks: Arc<LockRegistry>, remote: Arc<R>) -> Self {
        Self {
            store,
            locks,
            remote,
        }
    }

    /// Runs one recovery pass, oldest intent first.
    pub async fn run(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        for stuck in self.store.pending_intents() {
            let id = stuck.id.clone();
            let _guard = self.locks.acquire(&id).await;

            // Re-read under the lock: the protocol may have completed
            // between the scan and here.
            let Some(record) = self.store.get(&id) else {
                continue;
            };
            if record.intent.is_none() {
                continue;
            }

            match self.resume(&record).await {
                Ok(()) => {
                    info!(doc = %id, "interrupted transition resumed");
                    report.resumed.push(id);
                }
                Err(err) => {
                    warn!(doc = %id, error = %err, "recovery failed, will retry next pass");
                    report.failed.push((id, err.to_string()));
                }
            }
        }

        report
    }

    async fn resume(&self, record: &DocumentRecord) -> EngineResult<()> {
        intent::resume_reset(self.store.as_ref(), self.remote.as_ref(), record).await?;
        Ok(())
    }

    /// Documents with a pending intent, oldest first: the operator
    /// diagnostics surface for stuck entities.
    #[must_use]
    pub fn stuck_intents(&self) -> Vec<DocumentRecord> {
        self.store.pending_intents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_fsm::DocumentState;
    use docsync_remote::{MockRemoteIndex, RemoteError, RemoteOp};
    use docsync_store::{DocumentRecord, IntentKind, RecordChanges};

    async fn stuck_fixture(
        progress: u8,
    ) -> (Arc<StateStore>, Arc<MockRemoteIndex>, DocumentId) {
        let store = Arc::new(StateStore::open_in_memory());
        let remote = Arc::new(MockRemoteIndex::new());
        let id = DocumentId::new("doc-1");

        let file = remote.upload(b"content").await.unwrap();
        let doc = remote.import_to_index(&file).await.unwrap();

        store.insert(DocumentRecord::untracked(id.clone())).unwrap();
        store
            .cas_transition(
                &id,
                DocumentState::Untracked,
                0,
                DocumentState::Uploading,
                &RecordChanges::none(),
            )
            .unwrap();
        store
            .cas_transition(
                &id,
                DocumentState::Uploading,
                1,
                DocumentState::Processing,
                &RecordChanges::none().remote_file_id(Some(file.as_str().into())),
            )
            .unwrap();
        store
            .cas_transition(
                &id,
                DocumentState::Processing,
                2,
                DocumentState::Indexed,
                &RecordChanges::none().remote_store_doc_id(Some(doc.as_str().into())),
            )
            .unwrap();

        // Crash image: intent claimed, some progress, never finalized.
        assert!(store
            .cas_put_intent(&id, DocumentState::Indexed, 3, IntentKind::Reset)
            .unwrap());
        if progress >= 1 {
            remote.delete_index_doc(&doc).await.unwrap();
            store.advance_intent(&id, 1).unwrap();
        }
        if progress >= 2 {
            remote.delete_file(&file).await.unwrap();
            store.advance_intent(&id, 2).unwrap();
        }
        remote.clear_calls();

        (store, remote, id)
    }

    #[tokio::test]
    async fn resumes_all_remaining_steps_from_zero() {
        let (store, remote, id) = stuck_fixture(0).await;
        let crawler = RecoveryCrawler::new(
            Arc::clone(&store),
            Arc::new(LockRegistry::new()),
            Arc::clone(&remote),
        );

        let report = crawler.run().await;
        assert_eq!(report.resumed, vec![id.clone()]);
        assert!(report.failed.is_empty());

        let record = store.get(&id).unwrap();
        assert_eq!(record.state, DocumentState::Untracked);
        assert_eq!(record.version, 4);
        assert!(record.intent.is_none());
        assert_eq!(remote.calls_of(RemoteOp::DeleteIndexDoc), 1);
        assert_eq!(remote.calls_of(RemoteOp::DeleteFile), 1);
    }

    #[tokio::test]
    async fn progress_two_resumes_with_zero_remote_calls() {
        let (store, remote, id) = stuck_fixture(2).await;
        let crawler = RecoveryCrawler::new(
            Arc::clone(&store),
            Arc::new(LockRegistry::new()),
            Arc::clone(&remote),
        );

        let report = crawler.run().await;
        assert_eq!(report.resumed, vec![id.clone()]);
        assert!(remote.calls().is_empty());
        assert_eq!(store.get(&id).unwrap().state, DocumentState::Untracked);
    }

    #[tokio::test]
    async fn failure_is_logged_and_the_pass_continues() {
        let (store, remote, id) = stuck_fixture(0).await;
        // First delete fails this pass.
        remote.fail_next(RemoteOp::DeleteIndexDoc, RemoteError::Timeout);

        let crawler = RecoveryCrawler::new(
            Arc::clone(&store),
            Arc::new(LockRegistry::new()),
            Arc::clone(&remote),
        );

        let report = crawler.run().await;
        assert!(report.resumed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, id);

        // The intent survived; the next pass succeeds.
        let report = crawler.run().await;
        assert_eq!(report.resumed, vec![id.clone()]);
        assert!(crawler.stuck_intents().is_empty());
    }

    #[tokio::test]
    async fn clean_store_reports_clean() {
        let store = Arc::new(StateStore::open_in_memory());
        let crawler = RecoveryCrawler::new(
            store,
            Arc::new(LockRegistry::new()),
            Arc::new(MockRemoteIndex::new()),
        );
        assert!(crawler.run().await.is_clean());
    }
}
