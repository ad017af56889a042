//! Test fixtures and wiring helpers.

use async_trait::async_trait;
use docsync_engine::{
    content_digest, AttemptLog, DocumentSource, EngineConfig, EngineResult, LocalDocument,
    RecoveryCrawler, SyncOrchestrator, TransitionManager,
};
use docsync_fsm::LifecycleEvent;
use docsync_remote::{MockRemoteIndex, RemoteIndex};
use docsync_store::{DocumentId, LockRegistry, RecordChanges, StateStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A canned document source.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: Vec<LocalDocument>,
}

impl StaticSource {
    /// Creates a source returning exactly `documents` on every scan.
    #[must_use]
    pub fn new(documents: Vec<LocalDocument>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn scan(&self) -> EngineResult<Vec<LocalDocument>> {
        Ok(self.documents.clone())
    }
}

/// A fully wired engine for tests, with automatic cleanup.
pub struct SyncHarness {
    /// The state store.
    pub store: Arc<StateStore>,
    /// The scriptable remote.
    pub remote: Arc<MockRemoteIndex>,
    /// The per-document lock registry.
    pub locks: Arc<LockRegistry>,
    /// A transition manager over the above.
    pub manager: Arc<TransitionManager<MockRemoteIndex>>,
    /// Temp directory for file-backed stores (kept alive for cleanup).
    _temp_dir: Option<TempDir>,
}

impl SyncHarness {
    /// Creates a harness over an in-memory store.
    #[must_use]
    pub fn memory() -> Self {
        Self::build(Arc::new(StateStore::open_in_memory()), None)
    }

    /// Creates a harness over a file-backed store in a temp directory.
    #[must_use]
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let store =
            Arc::new(StateStore::open(temp_dir.path()).expect("failed to open state store"));
        Self::build(store, Some(temp_dir))
    }

    fn build(store: Arc<StateStore>, temp_dir: Option<TempDir>) -> Self {
        let remote = Arc::new(MockRemoteIndex::new());
        let locks = Arc::new(LockRegistry::new());
        let manager = Arc::new(TransitionManager::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&remote),
            AttemptLog::new(1024),
        ));
        Self {
            store,
            remote,
            locks,
            manager,
            _temp_dir: temp_dir,
        }
    }

    /// Reopens the file-backed store, simulating a process restart.
    ///
    /// The old store (and its directory lock) is dropped first; locks,
    /// manager, and the mock remote are rebuilt fresh, mirroring what a
    /// restarted process would hold. The mock remote's state survives;
    /// the remote service does not restart with the process.
    #[must_use]
    pub fn restart(self) -> Self {
        let temp_dir = self
            ._temp_dir
            .expect("restart requires a file-backed harness");
        let remote = self.remote;
        drop(self.manager);
        drop(self.locks);
        drop(self.store);

        let store =
            Arc::new(StateStore::open(temp_dir.path()).expect("failed to reopen state store"));
        let locks = Arc::new(LockRegistry::new());
        let manager = Arc::new(TransitionManager::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&remote),
            AttemptLog::new(1024),
        ));
        Self {
            store,
            remote,
            locks,
            manager,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Drives a document to `Indexed` with live resources in the mock.
    ///
    /// Returns with the mock's call log cleared so tests observe only
    /// their own calls.
    pub async fn seed_indexed(&self, id: &str, content: &[u8]) -> DocumentId {
        let id = DocumentId::new(id);
        let file = self.remote.upload(content).await.expect("upload failed");
        self.remote
            .wait_until_active(&file)
            .await
            .expect("activation failed");
        let doc = self
            .remote
            .import_to_index(&file)
            .await
            .expect("import failed");

        self.manager.create(&id).await.expect("create failed");
        self.manager
            .apply(&id, LifecycleEvent::StartUpload)
            .await
            .expect("start_upload failed");
        self.manager
            .apply_with(
                &id,
                LifecycleEvent::CompleteUpload,
                RecordChanges::none()
                    .remote_file_id(Some(file.as_str().to_string()))
                    .content_digest(Some(content_digest(content))),
            )
            .await
            .expect("complete_upload failed");
        self.manager
            .apply_with(
                &id,
                LifecycleEvent::CompleteProcessing,
                RecordChanges::none().remote_store_doc_id(Some(doc.as_str().to_string())),
            )
            .await
            .expect("complete_processing failed");

        self.remote.clear_calls();
        id
    }

    /// A recovery crawler sharing this harness's store, locks, and
    /// remote.
    #[must_use]
    pub fn crawler(&self) -> RecoveryCrawler<MockRemoteIndex> {
        RecoveryCrawler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.locks),
            Arc::clone(&self.remote),
        )
    }

    /// An orchestrator over this harness's store and remote, scanning
    /// the given documents.
    #[must_use]
    pub fn orchestrator(
        &self,
        documents: Vec<LocalDocument>,
        config: EngineConfig,
    ) -> SyncOrchestrator<StaticSource, Arc<MockRemoteIndex>> {
        SyncOrchestrator::new(
            Arc::clone(&self.store),
            StaticSource::new(documents),
            Arc::clone(&self.remote),
            config,
        )
    }
}
