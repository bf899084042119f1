// src/api/pipeline.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, impl_object};
use super::params::{Param, ParamSpec};
use super::resource::ResourceType;
use super::task::TaskSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PipelineSpec,
}

impl_object!(Pipeline, "Pipeline");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<PipelineDeclaredResource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<PipelineWorkspaceDeclaration>,
    pub tasks: Vec<PipelineTask>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<PipelineResult>,
}

impl PipelineSpec {
    pub fn task(&self, name: &str) -> Option<&PipelineTask> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// One node of the pipeline graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    pub name: String,
    pub task: TaskReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "PipelineTaskResources::is_empty")]
    pub resources: PipelineTaskResources,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<WorkspacePipelineTaskBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PipelineTaskCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_after: Vec<String>,
    #[serde(default)]
    pub retries: u32,
    #[serde(
        default,
        with = "crate::types::opt_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl PipelineTask {
    pub fn new(name: impl Into<String>, task: TaskReference) -> Self {
        Self {
            name: name.into(),
            task,
            params: Vec::new(),
            resources: PipelineTaskResources::default(),
            workspaces: Vec::new(),
            conditions: Vec::new(),
            run_after: Vec::new(),
            retries: 0,
            timeout: None,
        }
    }
}

/// How a node names the task it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskReference {
    /// A namespaced task in the run's namespace.
    Named { name: String },
    /// A cluster-scoped task.
    Cluster { name: String },
    Inline(TaskSpec),
}

impl TaskReference {
    pub fn named(name: impl Into<String>) -> Self {
        TaskReference::Named { name: name.into() }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        TaskReference::Cluster { name: name.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineTaskResources {
    pub inputs: Vec<PipelineTaskInputResource>,
    pub outputs: Vec<PipelineTaskOutputResource>,
}

impl PipelineTaskResources {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTaskInputResource {
    /// Name of the resource as declared by the task.
    pub name: String,
    /// Name of the pipeline-declared resource bound to it.
    pub resource: String,
    /// Nodes whose output of the same resource feeds this input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTaskOutputResource {
    pub name: String,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTaskCondition {
    pub condition_ref: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<PipelineTaskInputResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDeclaredResource {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ResourceType,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineWorkspaceDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacePipelineTaskBinding {
    /// Workspace name as declared by the task.
    pub name: String,
    /// Pipeline workspace it maps to.
    pub workspace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub value: String,
}
