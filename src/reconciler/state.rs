// src/reconciler/state.rs

//! Per-pass view of every node: its plan, the child it maps to, and that
//! child's observed state.

use std::collections::BTreeMap;

use crate::api::{
    ConditionCheckStatus, PipelineRun, PipelineSpec, Reason, TaskRun, TaskRunStatus,
};
use crate::dag::NodeState;
use crate::reconciler::names::NameGenerator;
use crate::resolve::{NodePlan, ResolvedCondition, ResultRef};

#[derive(Debug, Clone)]
pub struct ResolvedConditionCheck {
    pub condition: ResolvedCondition,
    /// Name of the condition-check task-run.
    pub name: String,
    pub task_run: Option<TaskRun>,
    /// Last snapshot recorded in the run status.
    pub recorded: Option<ConditionCheckStatus>,
}

impl ResolvedConditionCheck {
    fn status(&self) -> Option<ConditionCheckStatus> {
        match &self.task_run {
            Some(tr) => Some(ConditionCheckStatus::from_task_run(&tr.status)),
            None => self.recorded.clone().filter(ConditionCheckStatus::is_done),
        }
    }

    pub fn is_started(&self) -> bool {
        self.status().is_some()
    }

    pub fn is_done(&self) -> bool {
        self.status().is_some_and(|s| s.is_done())
    }

    pub fn is_successful(&self) -> bool {
        self.status().is_some_and(|s| s.is_successful())
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub plan: NodePlan,
    pub task_run_name: String,
    pub task_run: Option<TaskRun>,
    /// Terminal status recorded in the run status for a child that no
    /// longer exists.
    pub recorded: Option<TaskRunStatus>,
    pub condition_checks: Vec<ResolvedConditionCheck>,
}

impl ResolvedNode {
    pub fn name(&self) -> &str {
        &self.plan.task.name
    }

    /// Live status, or the recorded terminal status of a deleted child.
    pub fn status(&self) -> Option<&TaskRunStatus> {
        match &self.task_run {
            Some(tr) => Some(&tr.status),
            None => self.recorded.as_ref(),
        }
    }

    pub fn retries_used(&self) -> usize {
        self.status().map_or(0, |s| s.retries_status.len())
    }

    /// Failed, not cancelled, still present, and with retries left.
    pub fn is_retryable(&self) -> bool {
        self.task_run.as_ref().is_some_and(|tr| {
            tr.status.is_failed()
                && !tr.status.is_cancelled()
                && !tr.is_cancel_requested()
                && self.retries_used() < self.plan.task.retries as usize
        })
    }

    pub fn has_conditions(&self) -> bool {
        !self.condition_checks.is_empty()
    }

    pub fn condition_checks_failed(&self) -> bool {
        self.condition_checks
            .iter()
            .any(|cc| cc.is_done() && !cc.is_successful())
    }

    pub fn condition_checks_passed(&self) -> bool {
        self.condition_checks.iter().all(ResolvedConditionCheck::is_successful)
    }

    pub fn state(&self) -> NodeState {
        match self.status() {
            Some(s) if s.is_successful() => NodeState::Succeeded,
            Some(s) if s.is_cancelled() => NodeState::Cancelled,
            Some(s) if s.is_failed() => {
                if self.is_retryable() {
                    NodeState::Running
                } else {
                    NodeState::Failed
                }
            }
            Some(_) => NodeState::Running,
            None if self.condition_checks_failed() => NodeState::ConditionFailed,
            None if self.has_conditions()
                && !self.condition_checks_passed()
                && self.condition_checks.iter().all(ResolvedConditionCheck::is_started) =>
            {
                NodeState::Running
            }
            None => NodeState::Pending,
        }
    }

    /// Children of this node that are still executing.
    pub fn in_flight(&self) -> Vec<&TaskRun> {
        self.task_run
            .iter()
            .chain(self.condition_checks.iter().filter_map(|cc| cc.task_run.as_ref()))
            .filter(|tr| !tr.is_done())
            .collect()
    }
}

pub fn node_states(nodes: &[ResolvedNode]) -> BTreeMap<String, NodeState> {
    nodes
        .iter()
        .map(|n| (n.name().to_string(), n.state()))
        .collect()
}

/// Result lookup over the nodes that have succeeded.
pub fn result_lookup(nodes: &[ResolvedNode]) -> impl Fn(&ResultRef) -> Option<String> + '_ {
    move |r: &ResultRef| {
        nodes
            .iter()
            .find(|n| n.name() == r.task)
            .and_then(ResolvedNode::status)
            .filter(|s| s.is_successful())
            .and_then(|s| s.result(&r.result))
            .map(str::to_string)
    }
}

/// Pair each plan with its child names and any children already present.
///
/// Names come from the run status when recorded there, so a child is never
/// created twice under different names.
pub fn resolve_nodes(
    run: &PipelineRun,
    spec: &PipelineSpec,
    mut plans: BTreeMap<String, NodePlan>,
    children: &BTreeMap<String, TaskRun>,
    names: &dyn NameGenerator,
) -> Vec<ResolvedNode> {
    let mut nodes = Vec::with_capacity(spec.tasks.len());
    for task in &spec.tasks {
        let Some(plan) = plans.remove(&task.name) else {
            continue;
        };
        let entry = run.status.task_run_for(&task.name);

        let task_run_name = match entry {
            Some((name, _)) => name.clone(),
            None => names.restrict_length_with_random_suffix(&format!(
                "{}-{}",
                run.metadata.name, task.name
            )),
        };
        let task_run = children.get(&task_run_name).cloned();
        let recorded = entry
            .and_then(|(_, s)| s.status.clone())
            .filter(|s| s.is_done() && !is_condition_gate_marker(s));

        let condition_checks = plan
            .conditions
            .iter()
            .map(|condition| {
                let known = entry.and_then(|(_, s)| {
                    s.condition_checks
                        .iter()
                        .find(|(_, cc)| cc.condition_name == condition.register_name)
                });
                let name = match known {
                    Some((name, _)) => name.clone(),
                    None => names.restrict_length_with_random_suffix(&format!(
                        "{task_run_name}-{}",
                        condition.register_name
                    )),
                };
                ResolvedConditionCheck {
                    condition: condition.clone(),
                    task_run: children.get(&name).cloned(),
                    recorded: known.and_then(|(_, cc)| cc.status.clone()),
                    name,
                }
            })
            .collect();

        nodes.push(ResolvedNode {
            plan,
            task_run_name,
            task_run,
            recorded,
            condition_checks,
        });
    }
    nodes
}

/// The synthetic status written for a node whose condition checks failed.
pub fn is_condition_gate_marker(status: &TaskRunStatus) -> bool {
    status
        .succeeded()
        .is_some_and(|c| c.reason == Reason::ConditionCheckFailed.as_str())
}
