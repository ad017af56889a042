//! Drives a whole document set through the transition manager.

use crate::attempt::AttemptLog;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::manager::TransitionManager;
use crate::recovery::{RecoveryCrawler, RecoveryReport};
use async_trait::async_trait;
use docsync_fsm::{DocumentState, LifecycleEvent};
use docsync_remote::{
    delete_file_idempotent, delete_index_doc_idempotent, DocRef, FileRef, RemoteIndex,
};
use docsync_store::{
    now_millis, DocumentId, LockRegistry, OrphanRecord, RecordChanges, StateStore,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Hex SHA-256 digest of document content, used for change detection.
#[must_use]
pub fn content_digest(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// One locally observed document.
#[derive(Debug, Clone)]
pub struct LocalDocument {
    /// Stable document id.
    pub id: DocumentId,
    /// Raw content to upload.
    pub content: Vec<u8>,
}

impl LocalDocument {
    /// Creates a local document.
    pub fn new(id: impl Into<DocumentId>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// Produces the current set of local documents.
///
/// Folder walking and metadata extraction live behind this seam; the
/// orchestrator only consumes the scan result.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Scans for the current local documents.
    async fn scan(&self) -> EngineResult<Vec<LocalDocument>>;
}

/// Aggregate result of one sync run.
///
/// One document's failure never fails the run; it lands in `errors` and
/// the counts reflect what actually happened.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Documents the source reported.
    pub scanned: usize,
    /// Documents newly driven to the remote index.
    pub created: usize,
    /// Documents replaced via upload-first replacement.
    pub replaced: usize,
    /// Documents already up to date.
    pub unchanged: usize,
    /// Documents newly marked missing.
    pub missing_marked: usize,
    /// Missing documents pruned after the grace period.
    pub pruned: usize,
    /// Orphaned old remote versions deleted this run.
    pub orphans_swept: usize,
    /// Per-document failures: (document id, error).
    pub errors: Vec<(String, String)>,
}

enum DocOutcome {
    Created,
    Replaced,
    Unchanged,
}

/// Detects local changes and drives each document through the
/// transition manager and the remote index.
pub struct SyncOrchestrator<S, R> {
    source: S,
    store: Arc<StateStore>,
    remote: Arc<R>,
    locks: Arc<LockRegistry>,
    manager: Arc<TransitionManager<R>>,
    config: EngineConfig,
}

impl<S, R> SyncOrchestrator<S, R>
where
    S: DocumentSource,
    R: RemoteIndex + 'static,
{
    /// Creates an orchestrator over the given store, source, and remote.
    pub fn new(store: Arc<StateStore>, source: S, remote: R, config: EngineConfig) -> Self {
        let remote = Arc::new(remote);
        let locks = Arc::new(LockRegistry::new());
        let manager = Arc::new(TransitionManager::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&remote),
            AttemptLog::new(config.attempt_log_capacity),
        ));
        Self {
            source,
            store,
            remote,
            locks,
            manager,
            config,
        }
    }

    /// The transition manager (for direct event application).
    pub fn manager(&self) -> &Arc<TransitionManager<R>> {
        &self.manager
    }

    /// The underlying state store.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Runs one startup/periodic recovery pass, resuming documents left
    /// mid-protocol.
    pub async fn recover(&self) -> RecoveryReport {
        RecoveryCrawler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.locks),
            Arc::clone(&self.remote),
        )
        .run()
        .await
    }

    /// Runs one sync pass over the whole document set.
    ///
    /// # Errors
    ///
    /// Only a structural precondition failure (unreachable or
    /// misconfigured index target, unscannable source) aborts the run
    /// before per-document work begins; per-document failures are
    /// reported in the returned [`SyncReport`].
    pub async fn sync(&self) -> EngineResult<SyncReport> {
        self.remote.probe_target().await?;

        let documents = self.source.scan().await?;
        let mut report = SyncReport {
            scanned: documents.len(),
            ..SyncReport::default()
        };
        let seen: HashSet<DocumentId> =
            documents.iter().map(|doc| doc.id.clone()).collect();

        let gate = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut tasks = JoinSet::new();
        for document in documents {
            let store = Arc::clone(&self.store);
            let manager = Arc::clone(&self.manager);
            let remote = Arc::clone(&self.remote);
            let gate = Arc::clone(&gate);
            tasks.spawn(async move {
                let id = document.id.clone();
                let _permit = match gate.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (id, Err(EngineError::Source("concurrency gate closed".into())))
                    }
                };
                let outcome =
                    sync_document(store.as_ref(), manager.as_ref(), remote.as_ref(), document)
                        .await;
                (id, outcome)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(DocOutcome::Created))) => report.created += 1,
                Ok((_, Ok(DocOutcome::Replaced))) => report.replaced += 1,
                Ok((_, Ok(DocOutcome::Unchanged))) => report.unchanged += 1,
                Ok((id, Err(err))) => report.errors.push((id.to_string(), err.to_string())),
                Err(join_err) => report
                    .errors
                    .push(("<task>".into(), join_err.to_string())),
            }
        }

        self.handle_missing(&seen, &mut report).await;
        report.orphans_swept = self.sweep_orphans().await;

        info!(
            scanned = report.scanned,
            created = report.created,
            replaced = report.replaced,
            missing = report.missing_marked,
            pruned = report.pruned,
            errors = report.errors.len(),
            "sync pass finished"
        );
        Ok(report)
    }

    /// Marks documents absent from the scan and prunes those whose
    /// grace period has passed.
    async fn handle_missing(&self, seen: &HashSet<DocumentId>, report: &mut SyncReport) {
        let now = now_millis();
        let grace = self.config.missing_grace.as_millis() as u64;

        for record in self.store.list() {
            if seen.contains(&record.id) {
                continue;
            }
            match record.missing_since {
                None => match self.store.set_missing(&record.id, now) {
                    Ok(()) => report.missing_marked += 1,
                    Err(err) => report
                        .errors
                        .push((record.id.to_string(), err.to_string())),
                },
                Some(since) if now.saturating_sub(since) >= grace => {
                    let pruning = match record.state {
                        // Tears down both remote resources through the
                        // intent protocol, then flips to Untracked.
                        DocumentState::Indexed => {
                            Some(self.manager.apply(&record.id, LifecycleEvent::Reset).await)
                        }
                        // Mid-pipeline documents fail over; their refs
                        // are parked as orphans for the sweep.
                        DocumentState::Uploading | DocumentState::Processing => Some(
                            self.manager
                                .apply_with(
                                    &record.id,
                                    LifecycleEvent::Fail,
                                    RecordChanges::none()
                                        .last_error(Some("document missing locally".into())),
                                )
                                .await,
                        ),
                        // Nothing remote to remove.
                        DocumentState::Untracked | DocumentState::Failed => None,
                    };
                    match pruning {
                        Some(Ok(_)) => report.pruned += 1,
                        Some(Err(err)) => report
                            .errors
                            .push((record.id.to_string(), err.to_string())),
                        None => {}
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// Deletes orphaned old remote versions recorded by replacement and
    /// failure paths. Retryably failing orphans keep their marker for
    /// the next sweep.
    pub async fn sweep_orphans(&self) -> usize {
        let mut swept = 0;
        for orphan in self.store.orphans() {
            // A marker whose identifiers the record still points at was
            // written by a replacement that never committed; the
            // resources are live, so only the marker goes.
            let still_live = self.store.get(&orphan.doc_id).is_some_and(|record| {
                record.remote_file_id.as_deref() == Some(orphan.remote_file_id.as_str())
            });
            if still_live {
                if let Err(err) = self.store.remove_orphan(&orphan.remote_file_id) {
                    warn!(doc = %orphan.doc_id, error = %err, "failed to drop stale orphan marker");
                }
                continue;
            }

            let doc_ref = orphan.remote_store_doc_id.as_deref().map(DocRef::new);
            let file_ref = FileRef::new(orphan.remote_file_id.clone());
            let deleted: Result<(), docsync_remote::RemoteError> = async {
                delete_index_doc_idempotent(self.remote.as_ref(), doc_ref.as_ref()).await?;
                delete_file_idempotent(self.remote.as_ref(), Some(&file_ref)).await?;
                Ok(())
            }
            .await;

            match deleted {
                Ok(()) => {
                    if let Err(err) = self.store.remove_orphan(&orphan.remote_file_id) {
                        warn!(doc = %orphan.doc_id, error = %err, "orphan deleted remotely but marker not removed");
                        continue;
                    }
                    swept += 1;
                }
                Err(err) => {
                    warn!(
                        doc = %orphan.doc_id,
                        file = %orphan.remote_file_id,
                        error = %err,
                        "orphan sweep failed, keeping marker"
                    );
                }
            }
        }
        swept
    }
}

/// Classifies one scanned document and drives it accordingly.
async fn sync_document<R>(
    store: &StateStore,
    manager: &TransitionManager<R>,
    remote: &R,
    document: LocalDocument,
) -> EngineResult<DocOutcome>
where
    R: RemoteIndex,
{
    let digest = content_digest(&document.content);
    let id = document.id.clone();

    let Some(record) = store.get(&id) else {
        manager.create(&id).await?;
        ingest(manager, remote, &id, &document.content, &digest).await?;
        return Ok(DocOutcome::Created);
    };

    if record.missing_since.is_some() {
        store.clear_missing(&id)?;
    }

    match record.state {
        // Previously reset, pruned, or retried: run the pipeline again.
        DocumentState::Untracked => {
            ingest(manager, remote, &id, &document.content, &digest).await?;
            Ok(DocOutcome::Created)
        }
        // A record still mid-pipeline when its task starts was left
        // behind by an interrupted run; no task of this run has touched
        // it yet. Fail it over (parking any refs as orphans) and drive
        // the pipeline from the start.
        DocumentState::Uploading | DocumentState::Processing => {
            manager
                .apply_with(
                    &id,
                    LifecycleEvent::Fail,
                    RecordChanges::none().last_error(Some("ingest interrupted".into())),
                )
                .await?;
            manager.apply(&id, LifecycleEvent::Retry).await?;
            ingest(manager, remote, &id, &document.content, &digest).await?;
            Ok(DocOutcome::Created)
        }
        DocumentState::Indexed if record.content_digest.as_deref() != Some(digest.as_str()) => {
            replace(store, manager, remote, &id, record.version, &document.content, &digest)
                .await?;
            Ok(DocOutcome::Replaced)
        }
        _ => Ok(DocOutcome::Unchanged),
    }
}

/// Drives an untracked document to `Indexed` through the remote
/// pipeline, using the service's own completion signals.
async fn ingest<R>(
    manager: &TransitionManager<R>,
    remote: &R,
    id: &DocumentId,
    content: &[u8],
    digest: &str,
) -> EngineResult<()>
where
    R: RemoteIndex,
{
    manager.apply(id, LifecycleEvent::StartUpload).await?;

    let file = match remote.upload(content).await {
        Ok(file) => file,
        Err(err) => return fail_over(manager, id, err).await,
    };
    if let Err(err) = remote.wait_until_active(&file).await {
        // The file exists remotely but was never recorded locally; park
        // it so the sweep can delete it.
        manager.store().add_orphan(OrphanRecord {
            doc_id: id.clone(),
            remote_file_id: file.as_str().to_string(),
            remote_store_doc_id: None,
            recorded_at: now_millis(),
        })?;
        return fail_over(manager, id, err).await;
    }
    manager
        .apply_with(
            id,
            LifecycleEvent::CompleteUpload,
            RecordChanges::none()
                .remote_file_id(Some(file.as_str().to_string()))
                .content_digest(Some(digest.to_string())),
        )
        .await?;

    let doc = match remote.import_to_index(&file).await {
        Ok(doc) => doc,
        Err(err) => return fail_over(manager, id, err).await,
    };
    manager
        .apply_with(
            id,
            LifecycleEvent::CompleteProcessing,
            RecordChanges::none().remote_store_doc_id(Some(doc.as_str().to_string())),
        )
        .await?;

    Ok(())
}

/// Records a remote failure as data (`Failed` state, cause in the
/// record) and propagates the original error to the report.
async fn fail_over<R>(
    manager: &TransitionManager<R>,
    id: &DocumentId,
    err: docsync_remote::RemoteError,
) -> EngineResult<()>
where
    R: RemoteIndex,
{
    manager
        .apply_with(
            id,
            LifecycleEvent::Fail,
            RecordChanges::none().last_error(Some(err.to_string())),
        )
        .await?;
    Err(EngineError::Remote(err))
}

/// Upload-first replacement of a modified, indexed document.
///
/// The new remote version is fully created first; the old identifiers
/// are durably parked as an orphan marker before the record swaps to the
/// new ones; only then is the old version deleted. At no observable
/// instant does the document lack a valid remote representation, and a
/// crash at any point leaves either a stale marker (dropped by the
/// sweep) or a deletable orphan (cleaned by the sweep).
async fn replace<R>(
    store: &StateStore,
    manager: &TransitionManager<R>,
    remote: &R,
    id: &DocumentId,
    expected_version: u64,
    content: &[u8],
    digest: &str,
) -> EngineResult<()>
where
    R: RemoteIndex,
{
    let new_file = remote.upload(content).await?;
    let prepared: Result<DocRef, docsync_remote::RemoteError> = async {
        remote.wait_until_active(&new_file).await?;
        remote.import_to_index(&new_file).await
    }
    .await;
    let new_doc = match prepared {
        Ok(doc) => doc,
        Err(err) => {
            // The new upload exists remotely but will never be recorded;
            // park it for the sweep. The old version is untouched.
            store.add_orphan(OrphanRecord {
                doc_id: id.clone(),
                remote_file_id: new_file.as_str().to_string(),
                remote_store_doc_id: None,
                recorded_at: now_millis(),
            })?;
            return Err(EngineError::Remote(err));
        }
    };

    let record = store
        .get(id)
        .ok_or_else(|| EngineError::NotFound(id.clone()))?;
    let old_file = record.remote_file_id.clone();
    let old_doc = record.remote_store_doc_id.clone();

    if let Some(old_file) = old_file.clone() {
        store.add_orphan(OrphanRecord {
            doc_id: id.clone(),
            remote_file_id: old_file,
            remote_store_doc_id: old_doc.clone(),
            recorded_at: now_millis(),
        })?;
    }

    if let Err(err) = manager
        .replace_indexed_refs(id, expected_version, &new_file, &new_doc, digest)
        .await
    {
        // Lost the race: the record still points at the old version, so
        // the fresh uploads become the orphans instead.
        if let Some(old_file) = old_file.as_deref() {
            store.remove_orphan(old_file)?;
        }
        store.add_orphan(OrphanRecord {
            doc_id: id.clone(),
            remote_file_id: new_file.as_str().to_string(),
            remote_store_doc_id: Some(new_doc.as_str().to_string()),
            recorded_at: now_millis(),
        })?;
        return Err(err);
    }

    // The new identifiers are durable; now the old version can go. A
    // retryable failure keeps the marker for a later sweep.
    let doc_ref = old_doc.as_deref().map(DocRef::new);
    let file_ref = old_file.as_deref().map(FileRef::new);
    let cleanup: Result<(), docsync_remote::RemoteError> = async {
        delete_index_doc_idempotent(remote, doc_ref.as_ref()).await?;
        delete_file_idempotent(remote, file_ref.as_ref()).await?;
        Ok(())
    }
    .await;

    match cleanup {
        Ok(()) => {
            if let Some(old_file) = old_file.as_deref() {
                store.remove_orphan(old_file)?;
            }
        }
        Err(err) => {
            warn!(doc = %id, error = %err, "old remote version not yet deleted, orphan marker kept");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_remote::{MockRemoteIndex, RemoteError, RemoteOp};

    struct StaticSource {
        documents: Vec<LocalDocument>,
    }

    #[async_trait]
    impl DocumentSource for StaticSource {
        async fn scan(&self) -> EngineResult<Vec<LocalDocument>> {
            Ok(self.documents.clone())
        }
    }

    fn orchestrator(
        documents: Vec<LocalDocument>,
    ) -> SyncOrchestrator<StaticSource, MockRemoteIndex> {
        SyncOrchestrator::new(
            Arc::new(StateStore::open_in_memory()),
            StaticSource { documents },
            MockRemoteIndex::new(),
            EngineConfig::new(),
        )
    }

    #[test]
    fn digest_is_stable_hex() {
        let a = content_digest(b"hello");
        let b = content_digest(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_digest(b"world"));
    }

    #[tokio::test]
    async fn new_documents_reach_indexed() {
        let orch = orchestrator(vec![
            LocalDocument::new("doc-1", b"alpha".to_vec()),
            LocalDocument::new("doc-2", b"beta".to_vec()),
        ]);

        let report = orch.sync().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.created, 2);
        assert!(report.errors.is_empty());

        for id in ["doc-1", "doc-2"] {
            let record = orch.store().get(&DocumentId::new(id)).unwrap();
            assert_eq!(record.state, DocumentState::Indexed);
            assert_eq!(record.version, 3);
            assert!(record.remote_file_id.is_some());
            assert!(record.remote_store_doc_id.is_some());
        }
    }

    #[tokio::test]
    async fn second_run_is_unchanged() {
        let orch = orchestrator(vec![LocalDocument::new("doc-1", b"alpha".to_vec())]);
        orch.sync().await.unwrap();

        let report = orch.sync().await.unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(orch.store().get(&DocumentId::new("doc-1")).unwrap().version, 3);
    }

    #[tokio::test]
    async fn probe_failure_aborts_before_any_work() {
        let orch = orchestrator(vec![LocalDocument::new("doc-1", b"alpha".to_vec())]);
        let remote = Arc::clone(&orch.remote);
        remote.fail_next(RemoteOp::ProbeTarget, RemoteError::Denied("bad target".into()));

        let result = orch.sync().await;
        assert!(matches!(result, Err(EngineError::Remote(_))));
        assert!(orch.store().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_is_recorded_as_data() {
        let orch = orchestrator(vec![LocalDocument::new("doc-1", b"alpha".to_vec())]);
        let remote = Arc::clone(&orch.remote);
        remote.fail_next(RemoteOp::Upload, RemoteError::unavailable_retryable("overloaded"));

        let report = orch.sync().await.unwrap();
        assert_eq!(report.errors.len(), 1);

        let record = orch.store().get(&DocumentId::new("doc-1")).unwrap();
        assert_eq!(record.state, DocumentState::Failed);
        assert!(record.last_error.as_deref().unwrap().contains("overloaded"));
    }
}
