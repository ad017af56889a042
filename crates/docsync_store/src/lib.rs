//! # docsync Store
//!
//! Durable per-document state records with optimistic-concurrency writes.
//!
//! This crate provides:
//! - The persisted [`DocumentRecord`] (lifecycle state, OCC version,
//!   remote identifiers, write-ahead intent marker)
//! - [`StateStore`]: read and compare-and-swap write over an append-only
//!   journal, plus the write-ahead intent operations
//! - [`LockRegistry`]: lazily-created per-document async mutexes
//! - The orphan side table used by upload-first replacement
//!
//! ## Key Invariants
//!
//! - A committed transition bumps `version` by exactly 1, in the same
//!   write that checks the expected state and version
//! - A logical CAS mismatch is reported as `Ok(false)` and never retried
//!   internally; only transient writer-lock contention is retried, with
//!   a bounded backoff, surfacing [`StoreError::Busy`] past the bound
//! - Every committed write is flushed to the journal before it becomes
//!   visible to readers
//! - Replay tolerates a torn trailing frame and discards it; everything
//!   before it is kept

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod journal;
mod lock;
mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use lock::LockRegistry;
pub use record::{
    now_millis, DocumentId, DocumentRecord, IntentKind, IntentRecord, OrphanRecord,
    RecordChanges, INTENT_STEPS_TOTAL,
};
pub use store::{StateStore, StoreOptions};
