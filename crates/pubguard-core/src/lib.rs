//! Core library for the approval, publishing, and recovery system.
//!
//! This crate holds all business logic: the draft store and state machine,
//! the in-process event bus, the per-platform rate limiter, the platform
//! adapters, the publishing scheduler and executor, and the recovery
//! service. The server and CLI binaries are thin edges over this crate.
pub mod adapters;
pub mod approval;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod rate_limiter;
pub mod recovery;
pub mod scheduler;
pub mod scheduling;
pub mod storage;

/// Returns the version of the pubguard-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
