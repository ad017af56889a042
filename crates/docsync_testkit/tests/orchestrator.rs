//! Sync orchestrator scenarios: replacement, missing documents, orphans.

use docsync_engine::{EngineConfig, LocalDocument};
use docsync_fsm::DocumentState;
use docsync_remote::{RemoteCall, RemoteError, RemoteOp};
use docsync_store::DocumentId;
use docsync_testkit::SyncHarness;
use std::time::Duration;

fn quick_config() -> EngineConfig {
    EngineConfig::new().with_missing_grace(Duration::ZERO)
}

#[tokio::test]
async fn modified_document_is_replaced_upload_first() {
    let harness = SyncHarness::memory();
    let id = harness.seed_indexed("doc-1", b"version one").await;
    let old = harness.store.get(&id).unwrap();

    let orch = harness.orchestrator(
        vec![LocalDocument::new("doc-1", b"version two".to_vec())],
        quick_config(),
    );
    let report = orch.sync().await.unwrap();
    assert_eq!(report.replaced, 1);
    assert!(report.errors.is_empty());

    // Every call creating the new version precedes every delete of the
    // old one.
    let calls = harness.remote.calls();
    let last_create = calls
        .iter()
        .rposition(|call| {
            matches!(
                call.op(),
                RemoteOp::Upload | RemoteOp::WaitUntilActive | RemoteOp::ImportToIndex
            )
        })
        .unwrap();
    let first_delete = calls
        .iter()
        .position(|call| {
            matches!(call.op(), RemoteOp::DeleteIndexDoc | RemoteOp::DeleteFile)
        })
        .unwrap();
    assert!(
        last_create < first_delete,
        "old version touched before new one existed: {calls:?}"
    );

    // The old remote version is gone, the new one is live.
    let record = harness.store.get(&id).unwrap();
    assert_eq!(record.state, DocumentState::Indexed);
    assert_eq!(record.version, old.version + 1);
    assert_ne!(record.remote_file_id, old.remote_file_id);
    assert_ne!(record.remote_store_doc_id, old.remote_store_doc_id);
    assert_eq!(harness.remote.file_count(), 1);
    assert_eq!(harness.remote.doc_count(), 1);
    assert!(harness.store.orphans().is_empty());
}

#[tokio::test]
async fn failed_old_version_delete_leaves_orphan_for_next_sweep() {
    let harness = SyncHarness::memory();
    let id = harness.seed_indexed("doc-1", b"version one").await;

    // The replacement's cleanup and this run's sweep both fail.
    harness
        .remote
        .fail_next(RemoteOp::DeleteIndexDoc, RemoteError::Timeout);
    harness
        .remote
        .fail_next(RemoteOp::DeleteIndexDoc, RemoteError::Timeout);

    let orch = harness.orchestrator(
        vec![LocalDocument::new("doc-1", b"version two".to_vec())],
        quick_config(),
    );
    let report = orch.sync().await.unwrap();
    assert_eq!(report.replaced, 1);
    assert_eq!(report.orphans_swept, 0);

    // The replacement itself succeeded; the old version lingers under
    // its orphan marker.
    assert_eq!(harness.store.get(&id).unwrap().state, DocumentState::Indexed);
    assert_eq!(harness.store.orphans().len(), 1);
    assert_eq!(harness.remote.file_count(), 2);

    // A later run sweeps it.
    let report = orch.sync().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.orphans_swept, 1);
    assert!(harness.store.orphans().is_empty());
    assert_eq!(harness.remote.file_count(), 1);
    assert_eq!(harness.remote.doc_count(), 1);
}

#[tokio::test]
async fn missing_document_is_marked_then_pruned_after_grace() {
    let harness = SyncHarness::memory();
    let id = harness.seed_indexed("doc-1", b"content").await;

    // First run without the document: marked missing, nothing destroyed.
    let orch = harness.orchestrator(Vec::new(), quick_config());
    let report = orch.sync().await.unwrap();
    assert_eq!(report.missing_marked, 1);
    assert_eq!(report.pruned, 0);
    let record = harness.store.get(&id).unwrap();
    assert!(record.missing_since.is_some());
    assert_eq!(record.state, DocumentState::Indexed);
    assert_eq!(harness.remote.file_count(), 1);

    // Second run, grace elapsed: pruned through the reset protocol.
    let report = orch.sync().await.unwrap();
    assert_eq!(report.pruned, 1);
    let record = harness.store.get(&id).unwrap();
    assert_eq!(record.state, DocumentState::Untracked);
    assert!(record.remote_file_id.is_none());
    assert!(record.missing_since.is_some(), "the missing mark survives pruning");
    assert_eq!(harness.remote.file_count(), 0);
    assert_eq!(harness.remote.doc_count(), 0);
}

#[tokio::test]
async fn grace_period_defers_pruning() {
    let harness = SyncHarness::memory();
    let id = harness.seed_indexed("doc-1", b"content").await;

    let config = EngineConfig::new().with_missing_grace(Duration::from_secs(3600));
    let orch = harness.orchestrator(Vec::new(), config);

    orch.sync().await.unwrap();
    let report = orch.sync().await.unwrap();
    assert_eq!(report.pruned, 0, "grace period must defer pruning");
    assert_eq!(harness.store.get(&id).unwrap().state, DocumentState::Indexed);
    assert_eq!(harness.remote.file_count(), 1);
}

#[tokio::test]
async fn reappearing_document_clears_the_missing_mark() {
    let harness = SyncHarness::memory();
    let id = harness.seed_indexed("doc-1", b"content").await;

    // Disappears for one run (long grace: no pruning).
    let config = EngineConfig::new().with_missing_grace(Duration::from_secs(3600));
    harness.orchestrator(Vec::new(), config.clone()).sync().await.unwrap();
    assert!(harness.store.get(&id).unwrap().missing_since.is_some());

    // Comes back with unchanged content.
    let orch = harness.orchestrator(
        vec![LocalDocument::new("doc-1", b"content".to_vec())],
        config,
    );
    let report = orch.sync().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert!(harness.store.get(&id).unwrap().missing_since.is_none());
}

#[tokio::test]
async fn mid_pipeline_failure_parks_refs_and_the_sweep_cleans_them() {
    let harness = SyncHarness::memory();
    harness
        .remote
        .fail_next(RemoteOp::ImportToIndex, RemoteError::unavailable_retryable("importer down"));

    let orch = harness.orchestrator(
        vec![LocalDocument::new("doc-1", b"content".to_vec())],
        quick_config(),
    );
    let report = orch.sync().await.unwrap();
    assert_eq!(report.errors.len(), 1);
    // The uploaded file was parked as an orphan and swept in the same
    // run.
    assert_eq!(report.orphans_swept, 1);
    assert_eq!(harness.remote.file_count(), 0);

    let record = harness.store.get(&DocumentId::new("doc-1")).unwrap();
    assert_eq!(record.state, DocumentState::Failed);
    assert!(record.last_error.as_deref().unwrap().contains("importer down"));
    assert!(record.remote_file_id.is_none());
}

#[tokio::test]
async fn interrupted_ingest_is_failed_over_and_redriven() {
    let harness = SyncHarness::memory();
    let id = DocumentId::new("doc-1");

    // Crash image of an interrupted first run: the record never got
    // past Uploading and carries no intent.
    harness.manager.create(&id).await.unwrap();
    harness
        .manager
        .apply(&id, docsync_fsm::LifecycleEvent::StartUpload)
        .await
        .unwrap();

    let orch = harness.orchestrator(
        vec![LocalDocument::new("doc-1", b"content".to_vec())],
        quick_config(),
    );
    let report = orch.sync().await.unwrap();
    assert_eq!(report.created, 1);
    assert!(report.errors.is_empty());

    let record = harness.store.get(&id).unwrap();
    assert_eq!(record.state, DocumentState::Indexed);
    assert!(record.remote_file_id.is_some());
}

#[tokio::test]
async fn activation_failure_parks_the_unrecorded_upload() {
    let harness = SyncHarness::memory();
    harness.remote.fail_next(
        RemoteOp::WaitUntilActive,
        RemoteError::unavailable_fatal("processing failed"),
    );

    let orch = harness.orchestrator(
        vec![LocalDocument::new("doc-1", b"content".to_vec())],
        quick_config(),
    );
    let report = orch.sync().await.unwrap();
    assert_eq!(report.errors.len(), 1);

    // The upload succeeded remotely but was never recorded locally; the
    // sweep in the same run deletes it.
    assert_eq!(report.orphans_swept, 1);
    assert_eq!(harness.remote.file_count(), 0);
    assert_eq!(
        harness.store.get(&DocumentId::new("doc-1")).unwrap().state,
        DocumentState::Failed
    );
}

#[tokio::test]
async fn sync_run_reports_aggregate_counts_across_mixed_outcomes() {
    let harness = SyncHarness::memory();
    let existing = harness.seed_indexed("doc-keep", b"same").await;
    harness.seed_indexed("doc-gone", b"bye").await;

    // One new document fails its upload; one succeeds.
    harness
        .remote
        .fail_next(RemoteOp::Upload, RemoteError::Timeout);

    let orch = harness.orchestrator(
        vec![
            LocalDocument::new("doc-keep", b"same".to_vec()),
            LocalDocument::new("doc-new-bad", b"x".to_vec()),
            LocalDocument::new("doc-new-good", b"y".to_vec()),
        ],
        quick_config(),
    );
    let report = orch.sync().await.unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.created + report.errors.len(), 2);
    assert_eq!(report.missing_marked, 1);
    assert_eq!(harness.store.get(&existing).unwrap().state, DocumentState::Indexed);
}

#[tokio::test]
async fn recover_surface_resumes_before_syncing() {
    let harness = SyncHarness::memory();
    let id = harness.seed_indexed("doc-1", b"content").await;
    docsync_testkit::induce_reset_crash(
        &harness,
        &id,
        docsync_testkit::CrashPoint::AfterFirstDelete,
    )
    .await;

    let orch = harness.orchestrator(Vec::new(), quick_config());
    let report = orch.recover().await;
    assert_eq!(report.resumed, vec![id.clone()]);
    assert_eq!(harness.store.get(&id).unwrap().state, DocumentState::Untracked);
}

#[tokio::test]
async fn calls_are_recorded_in_issue_order() {
    // Guard against the mock reordering calls, which the upload-first
    // assertions depend on.
    let harness = SyncHarness::memory();
    let orch = harness.orchestrator(
        vec![LocalDocument::new("doc-1", b"content".to_vec())],
        quick_config(),
    );
    orch.sync().await.unwrap();

    let ops: Vec<RemoteOp> = harness.remote.calls().iter().map(RemoteCall::op).collect();
    assert_eq!(
        ops,
        vec![
            RemoteOp::ProbeTarget,
            RemoteOp::Upload,
            RemoteOp::WaitUntilActive,
            RemoteOp::ImportToIndex
        ]
    );
}
