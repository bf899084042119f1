// src/reconciler/scheduler.rs

//! Run scheduler: decide per node whether to wait, gate, create, or retry,
//! and issue the matching store mutation.

use tracing::{debug, info, warn};

use crate::api::{ConditionStatus, StatusCondition, TaskRun, TaskRunStatus, status::set_condition};
use crate::dag::{DagGraph, Readiness};
use crate::reconciler::child::{ChildContext, build_condition_check, build_task_run};
use crate::reconciler::state::{ResolvedNode, node_states, result_lookup};
use crate::reconciler::workspace;
use crate::resolve::ResolveError;
use crate::resolve::results::{ResultRef, apply_task_results};
use crate::store::{Store, StoreError};

pub struct Scheduler<'a> {
    pub store: &'a dyn Store,
    pub ctx: ChildContext<'a>,
}

impl Scheduler<'_> {
    /// Advance every node one step.
    ///
    /// Transient store failures come back as [`ResolveError::Store`]; nodes
    /// handled before the failure keep their new children.
    pub async fn run_next(
        &self,
        graph: &DagGraph,
        nodes: &mut [ResolvedNode],
    ) -> Result<(), ResolveError> {
        let states = node_states(nodes);
        let readiness = Readiness::new(graph, &states);
        let summary = readiness.summary();
        if summary.failed > 0 || summary.cancelled > 0 {
            debug!(
                failed = summary.failed,
                cancelled = summary.cancelled,
                "run is stopping; no new task-runs"
            );
            return Ok(());
        }
        let candidates = readiness.schedulable();

        for node in nodes.iter_mut().filter(|n| n.is_retryable()) {
            self.retry(node).await.map_err(ResolveError::Store)?;
        }

        if candidates.is_empty() {
            return Ok(());
        }

        let claims = workspace::required_claims(
            self.ctx.run,
            nodes.iter().map(|n| &n.plan.task),
            self.ctx.artifacts_in_use,
            &self.ctx.config.artifacts,
        );
        workspace::ensure_claims(self.store, &claims)
            .await
            .map_err(ResolveError::Store)?;

        for name in &candidates {
            let Some(idx) = nodes.iter().position(|n| n.name() == name) else {
                continue;
            };

            if nodes[idx].has_conditions() && !nodes[idx].condition_checks_passed() {
                self.start_condition_checks(nodes, idx).await?;
                continue;
            }

            let params = {
                let lookup = result_lookup(nodes);
                apply_task_results(&nodes[idx].plan.task.params, &lookup)
                    .map_err(invalid_result_reference)?
            };

            let node = &mut nodes[idx];
            let task_run = build_task_run(&self.ctx, node, params);
            let created = self.create(task_run).await.map_err(ResolveError::Store)?;
            info!(task = %node.name(), task_run = %created.metadata.name, "created task-run");
            node.task_run = Some(created);
        }
        Ok(())
    }

    async fn start_condition_checks(
        &self,
        nodes: &mut [ResolvedNode],
        idx: usize,
    ) -> Result<(), ResolveError> {
        let pending = {
            let lookup = result_lookup(nodes);
            nodes[idx]
                .condition_checks
                .iter()
                .enumerate()
                .filter(|(_, check)| check.task_run.is_none() && !check.is_started())
                .map(|(i, check)| {
                    apply_task_results(&check.condition.params, &lookup)
                        .map(|params| (i, params))
                        .map_err(invalid_result_reference)
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let node = &mut nodes[idx];
        for (i, params) in pending {
            let check = build_condition_check(&self.ctx, node, &node.condition_checks[i], params);
            let created = self.create(check).await.map_err(ResolveError::Store)?;
            info!(
                task = %node.name(),
                condition_check = %created.metadata.name,
                "created condition check"
            );
            node.condition_checks[i].task_run = Some(created);
        }
        Ok(())
    }

    /// Create, adopting an existing object of the same name that this run owns.
    async fn create(&self, task_run: TaskRun) -> Result<TaskRun, StoreError> {
        match self.store.create_task_run(&task_run).await {
            Ok(created) => Ok(created),
            Err(e) if e.is_already_exists() => {
                let ns = &task_run.metadata.namespace;
                let existing = self.store.get_task_run(ns, &task_run.metadata.name).await?;
                if existing.metadata.is_controlled_by(&self.ctx.run.owner_reference()) {
                    debug!(task_run = %existing.metadata.name, "adopting existing task-run");
                    Ok(existing)
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Reset a failed task-run in place, moving the failed attempt into its
    /// retry history.
    async fn retry(&self, node: &mut ResolvedNode) -> Result<(), StoreError> {
        let Some(current) = node.task_run.as_ref() else {
            return Ok(());
        };
        let mut task_run = current.clone();

        let mut failed = std::mem::take(&mut task_run.status);
        let mut history = std::mem::take(&mut failed.retries_status);
        history.push(failed);

        let mut status = TaskRunStatus {
            retries_status: history,
            ..TaskRunStatus::default()
        };
        set_condition(
            &mut status.conditions,
            StatusCondition::succeeded(ConditionStatus::Unknown, "", "", self.ctx.now),
        );
        task_run.status = status;

        let attempt = task_run.status.retries_status.len();
        match self.store.update_task_run_status(&task_run).await {
            Ok(updated) => {
                info!(
                    task = %node.name(),
                    task_run = %updated.metadata.name,
                    attempt,
                    retries = node.plan.task.retries,
                    "retrying failed task-run"
                );
                node.task_run = Some(updated);
                Ok(())
            }
            Err(e) => {
                warn!(task_run = %task_run.metadata.name, error = %e, "failed to reset task-run for retry");
                Err(e)
            }
        }
    }
}

fn invalid_result_reference(r: ResultRef) -> ResolveError {
    ResolveError::InvalidResultReference(format!(
        "Invalid task result reference: could not find result with name {} for task {}",
        r.result, r.task
    ))
}
