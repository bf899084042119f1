// src/api/taskrun.rs

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, impl_object, labels};
use super::params::Param;
use super::resource::ResourceSource;
use super::status::{StatusCondition, TASK_RUN_CANCELLED, succeeded_condition};
use super::task::{TaskKind, TaskSpec};
use super::volume::WorkspaceBinding;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub metadata: ObjectMeta,
    pub spec: TaskRunSpec,
    #[serde(default)]
    pub status: TaskRunStatus,
}

impl_object!(TaskRun, "TaskRun");

impl TaskRun {
    pub fn is_condition_check(&self) -> bool {
        self.metadata.labels.contains_key(labels::CONDITION_CHECK)
    }

    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_successful()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.is_cancelled()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.spec.status == Some(TaskRunSpecStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRunSpec {
    pub task: TaskRunTaskSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "TaskRunResources::is_empty")]
    pub resources: TaskRunResources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(
        default,
        with = "crate::types::opt_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<WorkspaceBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_storage: Option<ArtifactStorage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskRunSpecStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskRunTaskSource {
    Ref { name: String, kind: TaskKind },
    Inline(TaskSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskRunSpecStatus {
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRunResources {
    pub inputs: Vec<TaskResourceBinding>,
    pub outputs: Vec<TaskResourceBinding>,
}

impl TaskRunResources {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResourceBinding {
    pub name: String,
    pub resource: ResourceSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

/// Shared volume used for passing resources between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactStorage {
    pub claim_name: String,
    pub base_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskRunStatus {
    pub conditions: Vec<StatusCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<TaskRunResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retries_status: Vec<TaskRunStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepState>,
}

impl TaskRunStatus {
    pub fn succeeded(&self) -> Option<&StatusCondition> {
        succeeded_condition(&self.conditions)
    }

    pub fn is_done(&self) -> bool {
        self.succeeded().is_some_and(|c| !c.is_unknown())
    }

    pub fn is_successful(&self) -> bool {
        self.succeeded().is_some_and(StatusCondition::is_true)
    }

    pub fn is_failed(&self) -> bool {
        self.succeeded().is_some_and(StatusCondition::is_false)
    }

    pub fn is_cancelled(&self) -> bool {
        self.succeeded()
            .is_some_and(|c| c.is_false() && c.reason == TASK_RUN_CANCELLED)
    }

    pub fn result(&self, name: &str) -> Option<&str> {
        self.results
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunResult {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Condensed status of a condition-check task-run as recorded on the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConditionCheckStatus {
    pub conditions: Vec<StatusCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<StepState>,
}

impl ConditionCheckStatus {
    pub fn from_task_run(status: &TaskRunStatus) -> Self {
        Self {
            conditions: status.conditions.clone(),
            start_time: status.start_time,
            completion_time: status.completion_time,
            check: status.steps.first().cloned(),
        }
    }

    pub fn is_done(&self) -> bool {
        succeeded_condition(&self.conditions).is_some_and(|c| !c.is_unknown())
    }

    pub fn is_successful(&self) -> bool {
        succeeded_condition(&self.conditions).is_some_and(StatusCondition::is_true)
    }
}
