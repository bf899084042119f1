// src/resolve/mod.rs

//! Binding resolution: turn a pipeline definition plus a run into concrete
//! per-node execution plans.
//!
//! - [`validate`] performs admission-style checks of the spec and the run's bindings.
//! - [`params`] substitutes `$(params.X)` and context variables.
//! - [`results`] handles `$(tasks.X.results.Y)` references.
//! - [`task`], [`resources`] and [`conditions`] look up referenced objects.
//! - [`plan`] ties it together into a [`NodePlan`] per node.
//!
//! Failures here are definitional and end the run, except
//! [`ResolveError::Store`] which is a transient lookup failure.

pub mod conditions;
pub mod params;
pub mod plan;
pub mod resources;
pub mod results;
pub mod task;
pub mod validate;

use crate::api::{Reason, TaskKind};
use crate::dag::GraphError;
use crate::store::StoreError;

pub use conditions::ResolvedCondition;
pub use params::{ParamContext, apply_parameters};
pub use plan::{NodePlan, resolve_pipeline_plans};
pub use resources::{ResolvedResource, ResolvedResourceBinding};
pub use results::ResultRef;
pub use task::ResolvedTask;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("pipeline {namespace}/{name} can't be found: {source}")]
    PipelineNotFound {
        namespace: String,
        name: String,
        source: StoreError,
    },

    #[error("pipeline task {pipeline_task} references {kind:?} {name} which doesn't exist")]
    TaskNotFound {
        pipeline_task: String,
        kind: TaskKind,
        name: String,
    },

    #[error("pipeline task {pipeline_task} references condition {name} which doesn't exist")]
    ConditionNotFound { pipeline_task: String, name: String },

    #[error("resource binding {binding} references resource {name} which doesn't exist")]
    ResourceNotFound { binding: String, name: String },

    #[error("{0}")]
    InvalidBindings(String),

    #[error("{0}")]
    InvalidWorkspaceBindings(String),

    #[error("{0}")]
    ParameterTypeMismatch(String),

    #[error("{0}")]
    FailedValidation(String),

    #[error("invalid graph: {0}")]
    Graph(#[from] GraphError),

    #[error("{0}")]
    InvalidResultReference(String),

    #[error("transient store failure: {0}")]
    Store(StoreError),
}

impl ResolveError {
    /// Reason code recorded on the run, or `None` for transient failures.
    pub fn reason(&self) -> Option<Reason> {
        let reason = match self {
            ResolveError::PipelineNotFound { .. } => Reason::CouldntGetPipeline,
            ResolveError::TaskNotFound { .. } => Reason::CouldntGetTask,
            ResolveError::ConditionNotFound { .. } => Reason::CouldntGetCondition,
            ResolveError::ResourceNotFound { .. } => Reason::CouldntGetResource,
            ResolveError::InvalidBindings(_) => Reason::InvalidBindings,
            ResolveError::InvalidWorkspaceBindings(_) => Reason::InvalidWorkspaceBindings,
            ResolveError::ParameterTypeMismatch(_) => Reason::ParameterTypeMismatch,
            ResolveError::FailedValidation(_) => Reason::FailedValidation,
            ResolveError::Graph(GraphError::Cycle(_)) => Reason::InvalidGraph,
            ResolveError::Graph(_) => Reason::FailedValidation,
            ResolveError::InvalidResultReference(_) => Reason::InvalidTaskResultReference,
            ResolveError::Store(_) => return None,
        };
        Some(reason)
    }
}

/// Map a store lookup: `NotFound` becomes the given definitional error,
/// anything else is transient.
pub(crate) fn lookup<T>(
    result: Result<T, StoreError>,
    not_found: impl FnOnce(StoreError) -> ResolveError,
) -> Result<T, ResolveError> {
    match result {
        Ok(v) => Ok(v),
        Err(e) if e.is_not_found() => Err(not_found(e)),
        Err(e) => Err(ResolveError::Store(e)),
    }
}
