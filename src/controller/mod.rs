// src/controller/mod.rs

//! Controller loop around the reconciler.
//!
//! - [`queue`] is the pure, synchronous work queue (dedupe, in-flight
//!   exclusion, backoff accounting).
//! - [`runtime`] is the async shell: it feeds the queue from store watch
//!   events, periodic resyncs and delayed retries, and runs up to
//!   `workers` reconcile passes concurrently.

pub mod queue;
pub mod runtime;

pub use queue::{Backoff, WorkQueue};
pub use runtime::Controller;

/// Runtime options for the controller loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerOptions {
    /// Exit once no key is queued, in flight, or waiting for a retry
    /// (used for `--once`).
    pub exit_when_idle: bool,
}
