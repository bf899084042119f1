// src/dag/mod.rs

//! Graph resolution and readiness.
//!
//! - [`graph`] builds the immutable dependency graph of a pipeline and
//!   rejects cycles.
//! - [`readiness`] evaluates, for one pass, which nodes are schedulable,
//!   skipped or terminal given their observed states.

pub mod graph;
pub mod readiness;

pub use graph::{DagGraph, GraphError};
pub use readiness::{NodeState, Readiness, ReadinessSummary};
