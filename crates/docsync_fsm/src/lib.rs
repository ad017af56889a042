//! # docsync FSM
//!
//! The pure document lifecycle state machine.
//!
//! This crate provides:
//! - The fixed set of lifecycle states a tracked document moves through
//! - The fixed set of events that fire transitions
//! - A side-effect-free transition table (`can_fire` / `fire`)
//!
//! ## Key Invariants
//!
//! - Only the fixed edge set is legal; everything else is `NotAllowed`
//! - The table has no interior state and performs no I/O, so it is safe
//!   to call from any task without synchronization
//! - Whether a committed transition actually happened is decided by the
//!   store's compare-and-swap write, never by this table

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod machine;

pub use error::{FsmError, FsmResult};
pub use machine::{DocumentState, LifecycleEvent, TransitionTable, ALL_EVENTS, ALL_STATES};
