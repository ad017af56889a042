//! The remote index capability trait.

use crate::error::RemoteResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque reference to a raw uploaded file in the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(String);

impl FileRef {
    /// Wraps a remote file identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to an indexed document in the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocRef(String);

impl DocRef {
    /// Wraps a remote document identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The remote, eventually-consistent search index.
///
/// An opaque async capability: the engine drives it but knows nothing of
/// its internals. Every method may suspend; callers must assume a crash
/// or cancellation can occur at any await point and rely on the
/// write-ahead intent protocol, not on these calls, for consistency.
#[async_trait]
pub trait RemoteIndex: Send + Sync {
    /// Uploads raw content, returning the remote file reference.
    async fn upload(&self, content: &[u8]) -> RemoteResult<FileRef>;

    /// Waits until an uploaded file is active (poll-until-done).
    ///
    /// # Errors
    ///
    /// Fails if the remote processing of the file failed.
    async fn wait_until_active(&self, file: &FileRef) -> RemoteResult<()>;

    /// Imports an active file into the search index (poll-until-done),
    /// returning the indexed document reference.
    async fn import_to_index(&self, file: &FileRef) -> RemoteResult<DocRef>;

    /// Deletes an indexed document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RemoteError::NotFound`] if it is already absent;
    /// use [`crate::delete_index_doc_idempotent`] to absorb that.
    async fn delete_index_doc(&self, doc: &DocRef) -> RemoteResult<()>;

    /// Deletes a raw uploaded file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RemoteError::NotFound`] if it is already absent;
    /// use [`crate::delete_file_idempotent`] to absorb that.
    async fn delete_file(&self, file: &FileRef) -> RemoteResult<()>;

    /// Verifies the configured index target exists and is reachable.
    ///
    /// A failure here is structural: a sync run aborts before any
    /// per-document work begins.
    async fn probe_target(&self) -> RemoteResult<()>;
}

#[async_trait]
impl<T: RemoteIndex + ?Sized> RemoteIndex for std::sync::Arc<T> {
    async fn upload(&self, content: &[u8]) -> RemoteResult<FileRef> {
        (**self).upload(content).await
    }

    async fn wait_until_active(&self, file: &FileRef) -> RemoteResult<()> {
        (**self).wait_until_active(file).await
    }

    async fn import_to_index(&self, file: &FileRef) -> RemoteResult<DocRef> {
        (**self).import_to_index(file).await
    }

    async fn delete_index_doc(&self, doc: &DocRef) -> RemoteResult<()> {
        (**self).delete_index_doc(doc).await
    }

    async fn delete_file(&self, file: &FileRef) -> RemoteResult<()> {
        (**self).delete_file(file).await
    }

    async fn probe_target(&self) -> RemoteResult<()> {
        (**self).probe_target().await
    }
}
