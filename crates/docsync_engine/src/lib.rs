//! # docsync Engine
//!
//! Drives document lifecycle transitions against a local state store and
//! a remote search index, surviving crashes, races, and partial failure.
//!
//! This crate provides:
//! - [`TransitionManager`]: per-document lock → read → FSM check →
//!   compare-and-swap write, with a structured attempt log
//! - The write-ahead intent protocol for the multi-step reset transition
//! - [`RecoveryCrawler`]: resumes entities left mid-protocol by a crash
//! - [`SyncOrchestrator`]: drives a whole document set (new, modified
//!   with upload-first replacement, missing with a grace period) under a
//!   bounded concurrency cap
//!
//! ## Key Invariants
//!
//! - At most one committed transition per document per version
//! - A CAS conflict surfaces as [`EngineError::Stale`]; it is never
//!   retried silently
//! - Once an intent is recorded, only forward completion or the recovery
//!   crawler clears it; cancellation and timeout behave like a crash
//! - One entity's failure never fails a whole sync run; runs report
//!   aggregate counts

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attempt;
mod config;
mod error;
mod intent;
mod manager;
mod orchestrator;
mod recovery;

pub use attempt::{AttemptLog, AttemptOutcome, GuardOutcome, TransitionAttempt};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use manager::TransitionManager;
pub use orchestrator::{content_digest, DocumentSource, LocalDocument, SyncOrchestrator, SyncReport};
pub use recovery::{RecoveryCrawler, RecoveryReport};
