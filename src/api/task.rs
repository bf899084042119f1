// src/api/task.rs

use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, impl_object};
use super::params::ParamSpec;
use super::resource::ResourceType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TaskSpec,
}

/// Cluster-scoped task; `metadata.namespace` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTask {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TaskSpec,
}

impl_object!(Task, "Task");
impl_object!(ClusterTask, "ClusterTask");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    #[default]
    Task,
    ClusterTask,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
    #[serde(skip_serializing_if = "TaskResources::is_empty")]
    pub resources: TaskResources,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<WorkspaceDeclaration>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<TaskResultDecl>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskResources {
    pub inputs: Vec<TaskResource>,
    pub outputs: Vec<TaskResource>,
}

impl TaskResources {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResource {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ResourceType,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mount_path: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResultDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    pub name: String,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}
