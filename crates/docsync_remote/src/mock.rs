//! A scriptable in-memory remote index for testing.

use crate::api::{DocRef, FileRef, RemoteIndex};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

/// The remote operations, for scripting and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// `upload`
    Upload,
    /// `wait_until_active`
    WaitUntilActive,
    /// `import_to_index`
    ImportToIndex,
    /// `delete_index_doc`
    DeleteIndexDoc,
    /// `delete_file`
    DeleteFile,
    /// `probe_target`
    ProbeTarget,
}

/// One recorded remote call, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// An upload was issued.
    Upload,
    /// An activation poll was issued for the file.
    WaitUntilActive(String),
    /// An import was issued for the file.
    ImportToIndex(String),
    /// An index-document delete was issued.
    DeleteIndexDoc(String),
    /// A file delete was issued.
    DeleteFile(String),
    /// A target probe was issued.
    ProbeTarget,
}

impl RemoteCall {
    /// The operation this call belongs to.
    #[must_use]
    pub fn op(&self) -> RemoteOp {
        match self {
            RemoteCall::Upload => RemoteOp::Upload,
            RemoteCall::WaitUntilActive(_) => RemoteOp::WaitUntilActive,
            RemoteCall::ImportToIndex(_) => RemoteOp::ImportToIndex,
            RemoteCall::DeleteIndexDoc(_) => RemoteOp::DeleteIndexDoc,
            RemoteCall::DeleteFile(_) => RemoteOp::DeleteFile,
            RemoteCall::ProbeTarget => RemoteOp::ProbeTarget,
        }
    }
}

#[derive(Default)]
struct MockState {
    counter: u64,
    files: HashSet<String>,
    docs: HashSet<String>,
    calls: Vec<RemoteCall>,
    scripted: HashMap<RemoteOp, VecDeque<RemoteError>>,
    hang: HashSet<RemoteOp>,
}

/// A scriptable in-memory remote index.
///
/// Serves generated references, keeps the set of live remote resources
/// (so deleting an absent one yields `NotFound`, like the real service),
/// records every call in order, and supports per-operation failure
/// injection plus a hang gate for cancellation tests.
#[derive(Default)]
pub struct MockRemoteIndex {
    state: Mutex<MockState>,
}

impl MockRemoteIndex {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next call to `op` to fail with `error`.
    ///
    /// Multiple scripted failures for the same operation queue up in
    /// order. The failing call is still recorded.
    pub fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        self.state
            .lock()
            .scripted
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Makes every call to `op` park forever (after being recorded).
    ///
    /// Used with `tokio::time::timeout` to exercise the
    /// cancellation-equals-crash paths.
    pub fn hang_on(&self, op: RemoteOp) {
        self.state.lock().hang.insert(op);
    }

    /// Stops parking calls to `op`.
    pub fn release(&self, op: RemoteOp) {
        self.state.lock().hang.remove(&op);
    }

    /// All recorded calls, in issue order.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls for one operation.
    #[must_use]
    pub fn calls_of(&self, op: RemoteOp) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .count()
    }

    /// Forgets all recorded calls (scripting is unaffected).
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Returns true if the file currently exists remotely.
    #[must_use]
    pub fn contains_file(&self, file: &FileRef) -> bool {
        self.state.lock().files.contains(file.as_str())
    }

    /// Returns true if the indexed document currently exists remotely.
    #[must_use]
    pub fn contains_doc(&self, doc: &DocRef) -> bool {
        self.state.lock().docs.contains(doc.as_str())
    }

    /// Number of live remote files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    /// Number of live indexed documents.
    #[must_use]
    pub fn doc_count(&self) -> usize {
        self.state.lock().docs.len()
    }

    /// Records the call, applies scripted failures, then parks if the
    /// operation is gated.
    async fn enter(&self, op: RemoteOp, call: RemoteCall) -> RemoteResult<()> {
        let parked = {
            let mut state = self.state.lock();
            state.calls.push(call);
            if let Some(error) = state
                .scripted
                .get_mut(&op)
                .and_then(|queue| queue.pop_front())
            {
                return Err(error);
            }
            state.hang.contains(&op)
        };
        if parked {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteIndex for MockRemoteIndex {
    async fn upload(&self, _content: &[u8]) -> RemoteResult<FileRef> {
        self.enter(RemoteOp::Upload, RemoteCall::Upload).await?;
        let mut state = self.state.lock();
        state.counter += 1;
        let file = FileRef::new(format!("file-{}", state.counter));
        state.files.insert(file.as_str().to_string());
        Ok(file)
    }

    async fn wait_until_active(&self, file: &FileRef) -> RemoteResult<()> {
        self.enter(
            RemoteOp::WaitUntilActive,
            RemoteCall::WaitUntilActive(file.as_str().to_string()),
        )
        .await?;
        if self.state.lock().files.contains(file.as_str()) {
            Ok(())
        } else {
            Err(RemoteError::NotFound)
        }
    }

    async fn import_to_index(&self, file: &FileRef) -> RemoteResult<DocRef> {
        self.enter(
            RemoteOp::ImportToIndex,
            RemoteCall::ImportToIndex(file.as_str().to_string()),
        )
        .await?;
        let mut state = self.state.lock();
        if !state.files.contains(file.as_str()) {
            return Err(RemoteError::NotFound);
        }
        state.counter += 1;
        let doc = DocRef::new(format!("doc-{}", state.counter));
        state.docs.insert(doc.as_str().to_string());
        Ok(doc)
    }

    async fn delete_index_doc(&self, doc: &DocRef) -> RemoteResult<()> {
        self.enter(
            RemoteOp::DeleteIndexDoc,
            RemoteCall::DeleteIndexDoc(doc.as_str().to_string()),
        )
        .await?;
        if self.state.lock().docs.remove(doc.as_str()) {
            Ok(())
        } else {
            Err(RemoteError::NotFound)
        }
    }

    async fn delete_file(&self, file: &FileRef) -> RemoteResult<()> {
        self.enter(
            RemoteOp::DeleteFile,
            RemoteCall::DeleteFile(file.as_str().to_string()),
        )
        .await?;
        if self.state.lock().files.remove(file.as_str()) {
            Ok(())
        } else {
            Err(RemoteError::NotFound)
        }
    }

    async fn probe_target(&self) -> RemoteResult<()> {
        self.enter(RemoteOp::ProbeTarget, RemoteCall::ProbeTarget)
            .await
    }
}
