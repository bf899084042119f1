// src/api/pipelinerun.rs

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::meta::{API_VERSION, ObjectMeta, OwnerReference, impl_object};
use super::params::Param;
use super::pipeline::PipelineSpec;
use super::resource::PipelineResourceBinding;
use super::status::{StatusCondition, succeeded_condition};
use super::taskrun::{ConditionCheckStatus, TaskRunStatus};
use super::volume::WorkspaceBinding;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub metadata: ObjectMeta,
    pub spec: PipelineRunSpec,
    #[serde(default)]
    pub status: PipelineRunStatus,
}

impl_object!(PipelineRun, "PipelineRun");

impl PipelineRun {
    pub fn succeeded(&self) -> Option<&StatusCondition> {
        succeeded_condition(&self.status.conditions)
    }

    /// True once the `Succeeded` condition is True or False.
    pub fn is_done(&self) -> bool {
        self.succeeded().is_some_and(|c| !c.is_unknown())
    }

    pub fn is_cancelled(&self) -> bool {
        self.spec.status == Some(RunSpecStatus::Cancelled)
    }

    /// Owner reference placed on every child this run creates.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: API_VERSION.to_string(),
            kind: "PipelineRun".to_string(),
            name: self.metadata.name.clone(),
            controller: true,
            block_owner_deletion: true,
        }
    }

    /// Service account for a node: per-task override, then the run default.
    pub fn service_account_for(&self, pipeline_task: &str) -> Option<String> {
        self.spec
            .service_account_names
            .iter()
            .find(|sa| sa.task_name == pipeline_task)
            .map(|sa| sa.service_account_name.clone())
            .or_else(|| self.spec.service_account_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunSpec {
    pub pipeline: PipelineSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<PipelineResourceBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<WorkspaceBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_account_names: Vec<PipelineRunSpecServiceAccountName>,
    /// `None` means the configured default; zero means no timeout.
    #[serde(
        default,
        with = "crate::types::opt_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunSpecStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineSource {
    Ref { name: String },
    Inline(PipelineSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunSpecStatus {
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunSpecServiceAccountName {
    pub task_name: String,
    pub service_account_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineRunStatus {
    pub conditions: Vec<StatusCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    /// Keyed by generated task-run name.
    pub task_runs: BTreeMap<String, PipelineRunTaskRunStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pipeline_results: Vec<PipelineRunResult>,
    /// Snapshot of the spec the run was started with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_spec: Option<PipelineSpec>,
}

impl PipelineRunStatus {
    /// Key and entry recorded for a node, if any.
    pub fn task_run_for(&self, pipeline_task: &str) -> Option<(&String, &PipelineRunTaskRunStatus)> {
        self.task_runs
            .iter()
            .find(|(_, s)| s.pipeline_task_name == pipeline_task)
    }

    /// Whether `name` appears anywhere in the map, as a task-run or a condition check.
    pub fn knows_child(&self, name: &str) -> bool {
        self.task_runs.contains_key(name)
            || self
                .task_runs
                .values()
                .any(|s| s.condition_checks.contains_key(name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunTaskRunStatus {
    pub pipeline_task_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskRunStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub condition_checks: BTreeMap<String, PipelineRunConditionCheckStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunConditionCheckStatus {
    /// Register name, `<condition>-<ordinal>`.
    pub condition_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConditionCheckStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub name: String,
    pub value: String,
}
