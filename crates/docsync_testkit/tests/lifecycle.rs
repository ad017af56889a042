//! Lifecycle and contention scenarios across the whole engine.

use docsync_engine::{AttemptOutcome, EngineError};
use docsync_fsm::{DocumentState, LifecycleEvent};
use docsync_remote::RemoteOp;
use docsync_store::{DocumentId, RecordChanges};
use docsync_testkit::SyncHarness;
use std::sync::Arc;

#[tokio::test]
async fn doc_42_walks_untracked_to_indexed() {
    let harness = SyncHarness::memory();
    let id = DocumentId::new("doc-42");

    let record = harness.manager.create(&id).await.unwrap();
    assert_eq!(record.state, DocumentState::Untracked);
    assert_eq!(record.version, 0);

    let state = harness
        .manager
        .apply(&id, LifecycleEvent::StartUpload)
        .await
        .unwrap();
    assert_eq!(state, DocumentState::Uploading);
    assert_eq!(harness.store.get(&id).unwrap().version, 1);

    let state = harness
        .manager
        .apply_with(
            &id,
            LifecycleEvent::CompleteUpload,
            RecordChanges::none().remote_file_id(Some("X".into())),
        )
        .await
        .unwrap();
    assert_eq!(state, DocumentState::Processing);
    let record = harness.store.get(&id).unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.remote_file_id.as_deref(), Some("X"));

    let state = harness
        .manager
        .apply_with(
            &id,
            LifecycleEvent::CompleteProcessing,
            RecordChanges::none().remote_store_doc_id(Some("Y".into())),
        )
        .await
        .unwrap();
    assert_eq!(state, DocumentState::Indexed);
    let record = harness.store.get(&id).unwrap();
    assert_eq!(record.version, 3);
    assert_eq!(record.remote_store_doc_id.as_deref(), Some("Y"));
}

#[tokio::test]
async fn ten_concurrent_resets_have_exactly_one_winner() {
    let harness = SyncHarness::memory();
    let id = harness.seed_indexed("doc-42", b"content").await;
    let version = harness.store.get(&id).unwrap().version;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let manager = Arc::clone(&harness.manager);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            manager.apply_pinned(&id, LifecycleEvent::Reset, version).await
        }));
    }

    let mut successes = 0;
    let mut stale = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(state) => {
                assert_eq!(state, DocumentState::Untracked);
                successes += 1;
            }
            Err(EngineError::Stale { .. }) => stale += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(stale, 9);

    let record = harness.store.get(&id).unwrap();
    assert_eq!(record.state, DocumentState::Untracked);
    assert_eq!(record.version, version + 1);
    assert!(record.remote_file_id.is_none());
    assert!(record.remote_store_doc_id.is_none());
    assert!(record.intent.is_none());

    // The nine losers attempted no side effects.
    assert_eq!(harness.remote.calls_of(RemoteOp::DeleteIndexDoc), 1);
    assert_eq!(harness.remote.calls_of(RemoteOp::DeleteFile), 1);
}

#[tokio::test]
async fn concurrent_same_event_from_same_state_one_commits() {
    let harness = SyncHarness::memory();
    let id = DocumentId::new("doc-1");
    harness.manager.create(&id).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&harness.manager);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            manager.apply(&id, LifecycleEvent::StartUpload).await
        }));
    }

    let mut successes = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(EngineError::NotAllowed { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(rejected, 7);
    // The version advanced exactly once.
    assert_eq!(harness.store.get(&id).unwrap().version, 1);
}

#[tokio::test]
async fn concurrent_distinct_entities_all_commit() {
    let harness = SyncHarness::memory();

    let mut ids = Vec::new();
    for i in 0..8 {
        let id = DocumentId::new(format!("doc-{i}"));
        harness.manager.create(&id).await.unwrap();
        ids.push(id);
    }

    let mut handles = Vec::new();
    for id in &ids {
        let manager = Arc::clone(&harness.manager);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            manager.apply(&id, LifecycleEvent::StartUpload).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    for id in &ids {
        let record = harness.store.get(id).unwrap();
        assert_eq!(record.state, DocumentState::Uploading);
        assert_eq!(record.version, 1);
    }
}

#[tokio::test]
async fn failed_document_escapes_via_retry_without_manual_steps() {
    let harness = SyncHarness::memory();
    let id = DocumentId::new("doc-1");
    harness.manager.create(&id).await.unwrap();
    harness
        .manager
        .apply(&id, LifecycleEvent::StartUpload)
        .await
        .unwrap();
    harness
        .manager
        .apply_with(
            &id,
            LifecycleEvent::Fail,
            RecordChanges::none().last_error(Some("upload timed out".into())),
        )
        .await
        .unwrap();
    let failed = harness.store.get(&id).unwrap();
    assert_eq!(failed.state, DocumentState::Failed);

    let state = harness.manager.apply(&id, LifecycleEvent::Retry).await.unwrap();
    assert_eq!(state, DocumentState::Untracked);

    let record = harness.store.get(&id).unwrap();
    assert_eq!(record.version, failed.version + 1);
    assert!(record.remote_file_id.is_none());
    assert!(record.remote_store_doc_id.is_none());
}

#[tokio::test]
async fn final_version_equals_committed_transitions() {
    let harness = SyncHarness::memory();
    let id = harness.seed_indexed("doc-1", b"content").await;

    // Fire a few extra attempts that must not commit.
    let _ = harness.manager.apply(&id, LifecycleEvent::StartUpload).await;
    let _ = harness.manager.apply(&id, LifecycleEvent::Retry).await;

    let record = harness.store.get(&id).unwrap();
    let committed = harness
        .manager
        .attempts()
        .for_document(&id)
        .iter()
        .filter(|attempt| attempt.outcome == AttemptOutcome::Success)
        .count() as u64;
    assert_eq!(record.version, committed);
}

#[tokio::test]
async fn state_survives_restart() {
    let harness = SyncHarness::file();
    let id = harness.seed_indexed("doc-1", b"content").await;

    let harness = harness.restart();
    let record = harness.store.get(&id).unwrap();
    assert_eq!(record.state, DocumentState::Indexed);
    assert_eq!(record.version, 3);
    assert!(record.remote_file_id.is_some());
}
