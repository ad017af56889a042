//! Per-document async locks.

use crate::record::DocumentId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lazily-created per-document async mutexes.
///
/// Operations on the same document id are fully serialized; operations on
/// different ids run fully in parallel; there is no global lock. Each
/// mutex is created on first use and kept for the process lifetime, so a
/// given id always maps to the same mutex. The returned guard releases on
/// every exit path, including task cancellation.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<DocumentId, Arc<AsyncMutex<()>>>>,
}

impl LockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `id`, waiting if another task holds it.
    pub async fn acquire(&self, id: &DocumentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(
                locks
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of lock entries created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no locks have been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
