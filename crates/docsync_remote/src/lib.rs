//! # docsync Remote
//!
//! The remote search-index capability and its safety wrappers.
//!
//! This crate provides:
//! - [`RemoteIndex`]: the opaque async capability (upload, poll until
//!   active, import, delete by id, probe)
//! - Idempotent delete wrappers: "target already absent" counts as
//!   success, so a retried delete after a crash is always safe
//! - [`AdmissionControl`] and [`Gated`]: the admission gate (rate
//!   limiter / circuit breaker lives behind it) composed in front of any
//!   remote, behind the same trait
//! - [`MockRemoteIndex`]: a scriptable in-memory remote for tests
//!
//! The core never owns rate limiting or the remote service's internals;
//! it only calls through these seams.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod admission;
mod api;
mod error;
mod idempotent;
mod mock;

pub use admission::{AdmissionControl, Gated, Unlimited};
pub use api::{DocRef, FileRef, RemoteIndex};
pub use error::{RemoteError, RemoteResult};
pub use idempotent::{delete_file_idempotent, delete_index_doc_idempotent};
pub use mock::{MockRemoteIndex, RemoteCall, RemoteOp};
