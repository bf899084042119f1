#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use rundag::api::{
    ArrayOrString, ClusterTask, Condition, ConditionSpec, ConditionStatus, ObjectMeta, Param,
    ParamSpec, ParamType, Pipeline, PipelineDeclaredResource, PipelineResource,
    PipelineResourceBinding, PipelineResourceSpec, PipelineResult, PipelineRun, PipelineRunSpec,
    PipelineRunSpecServiceAccountName, PipelineSource, PipelineSpec, PipelineTask,
    PipelineTaskCondition, PipelineTaskInputResource, PipelineTaskOutputResource,
    PipelineWorkspaceDeclaration, ResourceSource, ResourceType, RunSpecStatus, StatusCondition,
    Step, Task, TaskKind, TaskReference, TaskResource, TaskResultDecl, TaskRun, TaskRunResult,
    TaskRunSpec, TaskRunStatus, TaskRunTaskSource, TaskSpec, WorkspaceBinding,
    WorkspaceDeclaration, WorkspacePipelineTaskBinding, WorkspaceSource, labels,
};

pub const NS: &str = "foo";

/// Builder for `Pipeline`.
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            pipeline: Pipeline {
                metadata: ObjectMeta::new(NS, name),
                spec: PipelineSpec::default(),
            },
        }
    }

    pub fn task(mut self, task: PipelineTask) -> Self {
        self.pipeline.spec.tasks.push(task);
        self
    }

    pub fn param(mut self, name: &str, default: Option<ArrayOrString>) -> Self {
        let type_ = default.as_ref().map_or(ParamType::String, ArrayOrString::param_type);
        self.pipeline.spec.params.push(ParamSpec {
            name: name.to_string(),
            type_,
            description: None,
            default,
        });
        self
    }

    pub fn array_param(mut self, name: &str) -> Self {
        self.pipeline.spec.params.push(ParamSpec {
            name: name.to_string(),
            type_: ParamType::Array,
            description: None,
            default: None,
        });
        self
    }

    pub fn resource(mut self, name: &str, type_: ResourceType) -> Self {
        self.pipeline.spec.resources.push(PipelineDeclaredResource {
            name: name.to_string(),
            type_,
            optional: false,
        });
        self
    }

    pub fn workspace(mut self, name: &str) -> Self {
        self.pipeline
            .spec
            .workspaces
            .push(PipelineWorkspaceDeclaration {
                name: name.to_string(),
                description: String::new(),
            });
        self
    }

    pub fn result(mut self, name: &str, value: &str) -> Self {
        self.pipeline.spec.results.push(PipelineResult {
            name: name.to_string(),
            description: String::new(),
            value: value.to_string(),
        });
        self
    }

    pub fn spec(self) -> PipelineSpec {
        self.pipeline.spec
    }

    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}

/// Builder for one `PipelineTask` node.
pub struct NodeBuilder {
    node: PipelineTask,
}

impl NodeBuilder {
    pub fn new(name: &str, task: &str) -> Self {
        Self {
            node: PipelineTask::new(name, TaskReference::named(task)),
        }
    }

    pub fn cluster(name: &str, task: &str) -> Self {
        Self {
            node: PipelineTask::new(name, TaskReference::cluster(task)),
        }
    }

    pub fn inline(name: &str, spec: TaskSpec) -> Self {
        Self {
            node: PipelineTask::new(name, TaskReference::Inline(spec)),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.node.run_after.push(dep.to_string());
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<ArrayOrString>) -> Self {
        self.node.params.push(Param::new(name, value));
        self
    }

    pub fn input(mut self, name: &str, resource: &str, from: &[&str]) -> Self {
        self.node.resources.inputs.push(PipelineTaskInputResource {
            name: name.to_string(),
            resource: resource.to_string(),
            from: from.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn output(mut self, name: &str, resource: &str) -> Self {
        self.node.resources.outputs.push(PipelineTaskOutputResource {
            name: name.to_string(),
            resource: resource.to_string(),
        });
        self
    }

    pub fn workspace(mut self, name: &str, workspace: &str, sub_path: &str) -> Self {
        self.node.workspaces.push(WorkspacePipelineTaskBinding {
            name: name.to_string(),
            workspace: workspace.to_string(),
            sub_path: sub_path.to_string(),
        });
        self
    }

    pub fn condition(mut self, condition: &str, params: Vec<Param>) -> Self {
        self.node.conditions.push(PipelineTaskCondition {
            condition_ref: condition.to_string(),
            params,
            resources: Vec::new(),
        });
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.node.retries = n;
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.node.timeout = Some(d);
        self
    }

    pub fn build(self) -> PipelineTask {
        self.node
    }
}

/// Builder for `Task` (or `ClusterTask`).
pub struct TaskBuilder {
    name: String,
    spec: TaskSpec,
}

impl TaskBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spec: TaskSpec {
                steps: vec![Step {
                    name: "step".to_string(),
                    image: "busybox".to_string(),
                    ..Step::default()
                }],
                ..TaskSpec::default()
            },
        }
    }

    pub fn param(mut self, name: &str) -> Self {
        self.spec.params.push(ParamSpec {
            name: name.to_string(),
            type_: ParamType::String,
            description: None,
            default: None,
        });
        self
    }

    pub fn array_param(mut self, name: &str) -> Self {
        self.spec.params.push(ParamSpec {
            name: name.to_string(),
            type_: ParamType::Array,
            description: None,
            default: None,
        });
        self
    }

    pub fn input(mut self, name: &str, type_: ResourceType) -> Self {
        self.spec.resources.inputs.push(TaskResource {
            name: name.to_string(),
            type_,
            optional: false,
        });
        self
    }

    pub fn output(mut self, name: &str, type_: ResourceType) -> Self {
        self.spec.resources.outputs.push(TaskResource {
            name: name.to_string(),
            type_,
            optional: false,
        });
        self
    }

    pub fn workspace(mut self, name: &str) -> Self {
        self.spec.workspaces.push(WorkspaceDeclaration {
            name: name.to_string(),
            mount_path: format!("/workspace/{name}"),
            optional: false,
        });
        self
    }

    pub fn result(mut self, name: &str) -> Self {
        self.spec.results.push(TaskResultDecl {
            name: name.to_string(),
            description: String::new(),
        });
        self
    }

    pub fn spec(self) -> TaskSpec {
        self.spec
    }

    pub fn build(self) -> Task {
        Task {
            metadata: ObjectMeta::new(NS, self.name),
            spec: self.spec,
        }
    }

    pub fn build_cluster(self) -> ClusterTask {
        ClusterTask {
            metadata: ObjectMeta::new("", self.name),
            spec: self.spec,
        }
    }
}

/// Builder for `PipelineRun`.
pub struct RunBuilder {
    run: PipelineRun,
}

impl RunBuilder {
    pub fn new(name: &str, pipeline: &str) -> Self {
        Self::with_source(
            name,
            PipelineSource::Ref {
                name: pipeline.to_string(),
            },
        )
    }

    pub fn inline(name: &str, spec: PipelineSpec) -> Self {
        Self::with_source(name, PipelineSource::Inline(spec))
    }

    fn with_source(name: &str, pipeline: PipelineSource) -> Self {
        Self {
            run: PipelineRun {
                metadata: ObjectMeta::new(NS, name),
                spec: PipelineRunSpec {
                    pipeline,
                    params: Vec::new(),
                    resources: Vec::new(),
                    workspaces: Vec::new(),
                    service_account_name: None,
                    service_account_names: Vec::new(),
                    timeout: None,
                    status: None,
                },
                status: Default::default(),
            },
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<ArrayOrString>) -> Self {
        self.run.spec.params.push(Param::new(name, value));
        self
    }

    pub fn resource_ref(mut self, binding: &str, resource: &str) -> Self {
        self.run.spec.resources.push(PipelineResourceBinding {
            name: binding.to_string(),
            resource: ResourceSource::Ref {
                name: resource.to_string(),
            },
        });
        self
    }

    pub fn workspace(mut self, name: &str, sub_path: &str, source: WorkspaceSource) -> Self {
        self.run.spec.workspaces.push(WorkspaceBinding {
            name: name.to_string(),
            sub_path: sub_path.to_string(),
            source,
        });
        self
    }

    pub fn service_account(mut self, sa: &str) -> Self {
        self.run.spec.service_account_name = Some(sa.to_string());
        self
    }

    pub fn task_service_account(mut self, task: &str, sa: &str) -> Self {
        self.run
            .spec
            .service_account_names
            .push(PipelineRunSpecServiceAccountName {
                task_name: task.to_string(),
                service_account_name: sa.to_string(),
            });
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.run.spec.timeout = Some(d);
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.run.spec.status = Some(RunSpecStatus::Cancelled);
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.run
            .metadata
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.run
            .metadata
            .annotations
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.run.status.start_time = Some(at);
        self
    }

    pub fn build(self) -> PipelineRun {
        self.run
    }
}

/// Builder for `Condition`.
pub struct ConditionBuilder {
    condition: Condition,
}

impl ConditionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            condition: Condition {
                metadata: ObjectMeta::new(NS, name),
                spec: ConditionSpec {
                    check: Step {
                        name: String::new(),
                        image: "foo".to_string(),
                        args: vec!["bar".to_string()],
                        ..Step::default()
                    },
                    params: Vec::new(),
                    resources: Vec::new(),
                },
            },
        }
    }

    pub fn param(mut self, name: &str) -> Self {
        self.condition.spec.params.push(ParamSpec {
            name: name.to_string(),
            type_: ParamType::String,
            description: None,
            default: None,
        });
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.condition
            .metadata
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Condition {
        self.condition
    }
}

/// Builder for a `TaskRun` child of a run, as if created by an earlier pass.
pub struct TaskRunBuilder {
    task_run: TaskRun,
}

impl TaskRunBuilder {
    /// Labelled and owned by `run`, for pipeline task `node`, running task `hello`.
    pub fn new(name: &str, run: &str, node: &str) -> Self {
        let mut metadata = ObjectMeta::new(NS, name);
        metadata
            .labels
            .insert(labels::PIPELINE_RUN.to_string(), run.to_string());
        metadata
            .labels
            .insert(labels::PIPELINE_TASK.to_string(), node.to_string());
        metadata
            .owner_references
            .push(RunBuilder::new(run, "").build().owner_reference());
        Self {
            task_run: TaskRun {
                metadata,
                spec: TaskRunSpec {
                    task: TaskRunTaskSource::Ref {
                        name: "hello".to_string(),
                        kind: TaskKind::Task,
                    },
                    params: Vec::new(),
                    resources: Default::default(),
                    service_account_name: None,
                    timeout: None,
                    workspaces: Vec::new(),
                    artifact_storage: None,
                    status: None,
                },
                status: TaskRunStatus::default(),
            },
        }
    }

    /// Mark as the check of `condition` (labels only).
    pub fn condition_check(mut self, condition: &str) -> Self {
        let name = self.task_run.metadata.name.clone();
        let meta = &mut self.task_run.metadata;
        meta.labels.insert(labels::CONDITION_CHECK.to_string(), name);
        meta.labels
            .insert(labels::CONDITION_NAME.to_string(), condition.to_string());
        self
    }

    /// Drop the selector labels, keeping only the owner reference.
    pub fn unlabelled(mut self) -> Self {
        self.task_run.metadata.labels.clear();
        self
    }

    pub fn status(mut self, status: TaskRunStatus) -> Self {
        self.task_run.status = status;
        self
    }

    pub fn build(self) -> TaskRun {
        self.task_run
    }
}

pub fn pipeline_resource(name: &str, type_: ResourceType) -> PipelineResource {
    PipelineResource {
        metadata: ObjectMeta::new(NS, name),
        spec: PipelineResourceSpec {
            type_,
            params: Vec::new(),
        },
    }
}

fn status_with(status: ConditionStatus, reason: &str, now: DateTime<Utc>) -> TaskRunStatus {
    TaskRunStatus {
        conditions: vec![StatusCondition::succeeded(status, reason, "", now)],
        start_time: Some(now),
        completion_time: (status != ConditionStatus::Unknown).then_some(now),
        ..TaskRunStatus::default()
    }
}

pub fn running(now: DateTime<Utc>) -> TaskRunStatus {
    status_with(ConditionStatus::Unknown, "Running", now)
}

pub fn succeeded(now: DateTime<Utc>) -> TaskRunStatus {
    status_with(ConditionStatus::True, "Succeeded", now)
}

pub fn succeeded_with(now: DateTime<Utc>, results: &[(&str, &str)]) -> TaskRunStatus {
    let mut status = succeeded(now);
    status.results = results
        .iter()
        .map(|(name, value)| TaskRunResult {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect();
    status
}

pub fn failed(now: DateTime<Utc>) -> TaskRunStatus {
    status_with(ConditionStatus::False, "Failed", now)
}

pub fn cancelled(now: DateTime<Utc>) -> TaskRunStatus {
    status_with(ConditionStatus::False, "TaskRunCancelled", now)
}
