//! # docsync Testkit
//!
//! Fixtures and crash harness for testing the docsync engine.
//!
//! This crate provides:
//! - [`SyncHarness`]: a wired store + mock remote + transition manager,
//!   in-memory or on disk with automatic cleanup
//! - [`StaticSource`]: a canned document source for orchestrator tests
//! - Crash-point helpers that leave a document mid-reset exactly as a
//!   process crash would, for recovery testing
//!
//! The workspace's cross-crate scenario tests live in this crate's
//! `tests/` directory.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crash;
mod fixtures;

pub use crash::{induce_reset_crash, CrashPoint};
pub use fixtures::{StaticSource, SyncHarness};
