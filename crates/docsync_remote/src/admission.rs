//! Admission control for the shared remote service.
//!
//! The remote API is a rate-limited shared resource. The core does not
//! implement rate limiting or circuit breaking; it calls through this
//! seam, and the host composes its own policy in front of the remote
//! with [`Gated`].

use crate::api::{DocRef, FileRef, RemoteIndex};
use crate::error::RemoteResult;
use async_trait::async_trait;

/// Grants permission to issue one remote call.
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    /// Waits for (or refuses) admission for one remote call.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RemoteError::RateLimited`] (or any other remote
    /// error) if the gate refuses; the refusal propagates to the caller
    /// of the gated remote operation.
    async fn acquire(&self) -> RemoteResult<()>;
}

/// A pass-through gate that admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl AdmissionControl for Unlimited {
    async fn acquire(&self) -> RemoteResult<()> {
        Ok(())
    }
}

/// A remote index gated by an admission-control policy.
///
/// Wraps any [`RemoteIndex`] behind the same trait, acquiring admission
/// before each call, so the engine never references the gate directly.
#[derive(Debug)]
pub struct Gated<R, A> {
    remote: R,
    admission: A,
}

impl<R, A> Gated<R, A> {
    /// Composes `admission` in front of `remote`.
    pub fn new(remote: R, admission: A) -> Self {
        Self { remote, admission }
    }

    /// Returns the wrapped remote.
    pub fn remote(&self) -> &R {
        &self.remote
    }
}

#[async_trait]
impl<R, A> RemoteIndex for Gated<R, A>
where
    R: RemoteIndex,
    A: AdmissionControl,
{
    async fn upload(&self, content: &[u8]) -> RemoteResult<FileRef> {
        self.admission.acquire().await?;
        self.remote.upload(content).await
    }

    async fn wait_until_active(&self, file: &FileRef) -> RemoteResult<()> {
        self.admission.acquire().await?;
        self.remote.wait_until_active(file).await
    }

    async fn import_to_index(&self, file: &FileRef) -> RemoteResult<DocRef> {
        self.admission.acquire().await?;
        self.remote.import_to_index(file).await
    }

    async fn delete_index_doc(&self, doc: &DocRef) -> RemoteResult<()> {
        self.admission.acquire().await?;
        self.remote.delete_index_doc(doc).await
    }

    async fn delete_file(&self, file: &FileRef) -> RemoteResult<()> {
        self.admission.acquire().await?;
        self.remote.delete_file(file).await
    }

    async fn probe_target(&self) -> RemoteResult<()> {
        self.admission.acquire().await?;
        self.remote.probe_target().await
    }
}
