// src/reconciler/child.rs

//! Construction of the task-run objects a pass creates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::api::{
    ObjectMeta, Param, PipelineRun, Step, TaskResource, TaskResourceBinding,
    TaskResources, TaskRun, TaskRunResources, TaskRunSpec, TaskRunTaskSource, TaskSpec, labels,
};
use crate::config::ReconcilerConfig;
use crate::reconciler::state::{ResolvedConditionCheck, ResolvedNode};
use crate::reconciler::{timeout, workspace};
use crate::resolve::ResolvedResourceBinding;

/// Run-wide inputs shared by every child built in one pass.
pub struct ChildContext<'a> {
    pub run: &'a PipelineRun,
    pub pipeline_name: &'a str,
    pub config: &'a ReconcilerConfig,
    pub now: DateTime<Utc>,
    /// Whether the run moves resources between nodes through the artifact claim.
    pub artifacts_in_use: bool,
}

impl ChildContext<'_> {
    fn labels(&self, node: &str) -> BTreeMap<String, String> {
        let mut out = self.run.metadata.labels.clone();
        self.insert_identity_labels(&mut out, node);
        out
    }

    /// Labels orphan recovery keys on. Inserted last so nothing overrides them.
    fn insert_identity_labels(&self, out: &mut BTreeMap<String, String>, node: &str) {
        out.insert(labels::PIPELINE.to_string(), self.pipeline_name.to_string());
        out.insert(labels::PIPELINE_RUN.to_string(), self.run.metadata.name.clone());
        out.insert(labels::PIPELINE_TASK.to_string(), node.to_string());
    }

    fn metadata(&self, name: &str, node: &str) -> ObjectMeta {
        let mut meta = ObjectMeta::new(self.run.metadata.namespace.clone(), name);
        meta.labels = self.labels(node);
        meta.annotations = self.run.metadata.annotations.clone();
        meta.owner_references.push(self.run.owner_reference());
        meta
    }

    fn service_account(&self, node: &str) -> Option<String> {
        self.run
            .service_account_for(node)
            .or_else(|| self.config.defaults.service_account.clone())
    }

    fn input_bindings(&self, inputs: &[ResolvedResourceBinding]) -> Vec<TaskResourceBinding> {
        let base = &self.config.artifacts.base_path;
        inputs
            .iter()
            .map(|i| TaskResourceBinding {
                name: i.name.clone(),
                resource: i.resource.source.clone(),
                paths: if self.artifacts_in_use {
                    workspace::input_paths(base, &i.from, &i.name)
                } else {
                    Vec::new()
                },
            })
            .collect()
    }
}

/// The task-run for `node`, with result references already substituted
/// into `params`.
pub fn build_task_run(ctx: &ChildContext<'_>, node: &ResolvedNode, params: Vec<Param>) -> TaskRun {
    let plan = &node.plan;
    let base = &ctx.config.artifacts.base_path;
    let touches = workspace::touches_artifact_storage(plan, ctx.artifacts_in_use);

    let outputs = plan
        .outputs
        .iter()
        .map(|o| TaskResourceBinding {
            name: o.name.clone(),
            resource: o.resource.source.clone(),
            paths: if ctx.artifacts_in_use {
                vec![workspace::output_path(base, node.name(), &o.name)]
            } else {
                Vec::new()
            },
        })
        .collect();

    TaskRun {
        metadata: ctx.metadata(&node.task_run_name, node.name()),
        spec: TaskRunSpec {
            task: plan.resolved_task.source.clone(),
            params,
            resources: TaskRunResources {
                inputs: ctx.input_bindings(&plan.inputs),
                outputs,
            },
            service_account_name: ctx.service_account(node.name()),
            timeout: Some(timeout::task_run_timeout(ctx.run, &plan.task, ctx.config, ctx.now)),
            workspaces: workspace::node_workspaces(ctx.run, &plan.task),
            artifact_storage: touches.then(|| workspace::artifact_storage(ctx.run, &ctx.config.artifacts)),
            status: None,
        },
        status: Default::default(),
    }
}

/// The gating task-run for one condition of `node`.
///
/// It runs the condition's single check step inline. `params` are the
/// condition params with result references already substituted.
pub fn build_condition_check(
    ctx: &ChildContext<'_>,
    node: &ResolvedNode,
    check: &ResolvedConditionCheck,
    params: Vec<Param>,
) -> TaskRun {
    let condition = &check.condition.condition;
    let cond_name = condition.metadata.name.as_str();

    let mut meta = ctx.metadata(&check.name, node.name());
    meta.labels.extend(condition.metadata.labels.clone());
    ctx.insert_identity_labels(&mut meta.labels, node.name());
    meta.labels.insert(labels::CONDITION_CHECK.to_string(), check.name.clone());
    meta.labels.insert(labels::CONDITION_NAME.to_string(), cond_name.to_string());
    meta.annotations.extend(condition.metadata.annotations.clone());

    let step = Step {
        name: format!("condition-check-{cond_name}"),
        image: if condition.spec.check.image.is_empty() {
            ctx.config.defaults.condition_image.clone()
        } else {
            condition.spec.check.image.clone()
        },
        ..condition.spec.check.clone()
    };

    let inputs: Vec<TaskResource> = condition.spec.resources.clone();
    let spec = TaskSpec {
        params: condition.spec.params.clone(),
        resources: TaskResources {
            inputs,
            outputs: Vec::new(),
        },
        steps: vec![step],
        ..TaskSpec::default()
    };

    let touches = ctx.artifacts_in_use
        && check.condition.resources.iter().any(|r| !r.from.is_empty());

    TaskRun {
        metadata: meta,
        spec: TaskRunSpec {
            task: TaskRunTaskSource::Inline(spec),
            params,
            resources: TaskRunResources {
                inputs: ctx.input_bindings(&check.condition.resources),
                outputs: Vec::new(),
            },
            service_account_name: ctx.service_account(node.name()),
            timeout: Some(timeout::task_run_timeout(
                ctx.run,
                &node.plan.task,
                ctx.config,
                ctx.now,
            )),
            workspaces: Vec::new(),
            artifact_storage: touches
                .then(|| workspace::artifact_storage(ctx.run, &ctx.config.artifacts)),
            status: None,
        },
        status: Default::default(),
    }
}
