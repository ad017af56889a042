//! Idempotent delete wrappers.
//!
//! A retried delete after a crash may be re-attempting something that
//! already succeeded remotely but whose local acknowledgment was lost.
//! These wrappers make that retry always safe: an absent target counts
//! as successful deletion, and a blank reference is a no-op success.
//! Every other failure propagates unchanged.

use crate::api::{DocRef, FileRef, RemoteIndex};
use crate::error::RemoteResult;
use tracing::debug;

/// Deletes an indexed document, treating "already absent" as success.
pub async fn delete_index_doc_idempotent<R>(
    remote: &R,
    doc: Option<&DocRef>,
) -> RemoteResult<()>
where
    R: RemoteIndex + ?Sized,
{
    let Some(doc) = doc else {
        return Ok(());
    };
    match remote.delete_index_doc(doc).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_not_found() => {
            debug!(doc = %doc, "index document already absent");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Deletes a raw uploaded file, treating "already absent" as success.
pub async fn delete_file_idempotent<R>(remote: &R, file: Option<&FileRef>) -> RemoteResult<()>
where
    R: RemoteIndex + ?Sized,
{
    let Some(file) = file else {
        return Ok(());
    };
    match remote.delete_file(file).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_not_found() => {
            debug!(file = %file, "remote file already absent");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::mock::{MockRemoteIndex, RemoteOp};

    #[tokio::test]
    async fn blank_ref_is_noop_success() {
        let remote = MockRemoteIndex::new();
        delete_file_idempotent(&remote, None).await.unwrap();
        delete_index_doc_idempotent(&remote, None).await.unwrap();
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn absent_target_is_success_twice_in_a_row() {
        let remote = MockRemoteIndex::new();
        let file = remote.upload(b"content").await.unwrap();

        delete_file_idempotent(&remote, Some(&file)).await.unwrap();
        // Second delete hits an absent target and still succeeds.
        delete_file_idempotent(&remote, Some(&file)).await.unwrap();
        assert_eq!(remote.calls_of(RemoteOp::DeleteFile), 2);
    }

    #[tokio::test]
    async fn other_failures_propagate_unchanged() {
        let remote = MockRemoteIndex::new();
        let file = remote.upload(b"content").await.unwrap();
        remote.fail_next(RemoteOp::DeleteFile, RemoteError::Timeout);

        let result = delete_file_idempotent(&remote, Some(&file)).await;
        assert_eq!(result, Err(RemoteError::Timeout));
    }
}
