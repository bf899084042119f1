// src/api/mod.rs

//! Typed control-plane objects consumed and produced by the reconciler.
//!
//! Everything here is plain data (serde) with a few convenience accessors.
//! Behaviour lives in `resolve`, `reconciler` and `store`.

pub mod condition;
pub mod meta;
pub mod params;
pub mod pipeline;
pub mod pipelinerun;
pub mod resource;
pub mod status;
pub mod task;
pub mod taskrun;
pub mod volume;

pub use condition::{Condition, ConditionSpec};
pub use meta::{ObjectMeta, Object, OwnerReference, labels, split_key};
pub use params::{ArrayOrString, Param, ParamSpec, ParamType};
pub use pipeline::{
    Pipeline, PipelineDeclaredResource, PipelineResult, PipelineSpec, PipelineTask,
    PipelineTaskCondition, PipelineTaskInputResource, PipelineTaskOutputResource,
    PipelineTaskResources, PipelineWorkspaceDeclaration, TaskReference,
    WorkspacePipelineTaskBinding,
};
pub use pipelinerun::{
    PipelineRun, PipelineRunConditionCheckStatus, PipelineRunResult, PipelineRunSpec,
    PipelineRunSpecServiceAccountName, PipelineRunStatus, PipelineRunTaskRunStatus,
    PipelineSource, RunSpecStatus,
};
pub use resource::{
    PipelineResource, PipelineResourceBinding, PipelineResourceSpec, ResourceParam,
    ResourceSource, ResourceType,
};
pub use status::{ConditionStatus, Reason, StatusCondition};
pub use task::{
    ClusterTask, Step, Task, TaskKind, TaskResource, TaskResources, TaskResultDecl, TaskSpec,
    WorkspaceDeclaration,
};
pub use taskrun::{
    ArtifactStorage, ConditionCheckStatus, StepState, TaskResourceBinding, TaskRun,
    TaskRunResources, TaskRunResult, TaskRunSpec, TaskRunSpecStatus, TaskRunStatus,
    TaskRunTaskSource,
};
pub use volume::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeClaimTemplate, WorkspaceBinding,
    WorkspaceSource,
};
