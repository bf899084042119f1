// src/reconciler/status.rs

//! Status aggregation: merge observed children into the run status, recover
//! orphans, and derive the run's `Succeeded` condition.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::api::{
    ConditionCheckStatus, ConditionStatus, PipelineRun, PipelineRunConditionCheckStatus,
    PipelineSpec, Reason, StatusCondition, TaskRun, labels, status::set_condition,
};
use crate::dag::{DagGraph, NodeState, Readiness};
use crate::reconciler::names::NameGenerator;
use crate::reconciler::state::{ResolvedNode, node_states, result_lookup};
use crate::resolve::conditions::register_name;
use crate::resolve::results::pipeline_results;

pub const MSG_ALL_COMPLETED: &str = "All Tasks have completed executing";
pub const MSG_RUNNING: &str = "Not all Tasks in the Pipeline have finished executing";

pub fn set_run_condition(
    run: &mut PipelineRun,
    status: ConditionStatus,
    reason: Reason,
    message: impl Into<String>,
    now: DateTime<Utc>,
) {
    set_condition(
        &mut run.status.conditions,
        StatusCondition::succeeded(status, reason.as_str(), message, now),
    );
    if status != ConditionStatus::Unknown && run.status.completion_time.is_none() {
        run.status.completion_time = Some(now);
    }
}

/// Copy the current status of every child already named in the run status.
pub fn refresh_known_children(run: &mut PipelineRun, children: &BTreeMap<String, TaskRun>) {
    for (name, entry) in run.status.task_runs.iter_mut() {
        if let Some(tr) = children.get(name) {
            entry.status = Some(tr.status.clone());
        }
        for (cc_name, cc) in entry.condition_checks.iter_mut() {
            if let Some(tr) = children.get(cc_name) {
                cc.status = Some(ConditionCheckStatus::from_task_run(&tr.status));
            }
        }
    }
}

/// Merge labelled children the status map does not know about.
///
/// Ordinary task-runs go first so that orphaned condition checks can attach
/// to their node's entry. Returns how many children were recovered.
pub fn recover_orphans(
    run: &mut PipelineRun,
    children: &BTreeMap<String, TaskRun>,
    names: &dyn NameGenerator,
) -> usize {
    let mut recovered = 0;

    for tr in children.values().filter(|tr| !tr.is_condition_check()) {
        let name = tr.metadata.name.as_str();
        if run.status.knows_child(name) {
            continue;
        }
        let Some(node) = tr.metadata.label(labels::PIPELINE_TASK) else {
            warn!(task_run = %name, "labelled child has no pipeline task label");
            continue;
        };

        // An entry that never saw its task-run is superseded by the one found.
        let stale = run
            .status
            .task_runs
            .iter()
            .find(|(key, s)| {
                s.pipeline_task_name == node
                    && s.status.is_none()
                    && !children.contains_key(key.as_str())
            })
            .map(|(key, _)| key.clone());
        let mut entry = stale
            .and_then(|key| run.status.task_runs.remove(&key))
            .unwrap_or_default();
        entry.pipeline_task_name = node.to_string();
        entry.status = Some(tr.status.clone());
        run.status.task_runs.insert(name.to_string(), entry);

        info!(task_run = %name, task = %node, "recovered orphaned task-run");
        recovered += 1;
    }

    for tr in children.values().filter(|tr| tr.is_condition_check()) {
        let name = tr.metadata.name.as_str();
        if run.status.knows_child(name) {
            continue;
        }
        let Some(node) = tr.metadata.label(labels::PIPELINE_TASK) else {
            warn!(condition_check = %name, "labelled child has no pipeline task label");
            continue;
        };
        let condition = tr.metadata.label(labels::CONDITION_NAME).unwrap_or_default();
        let register = recovered_register_name(run.status.pipeline_spec.as_ref(), node, condition, name);

        let key = match run.status.task_run_for(node) {
            Some((key, _)) => key.clone(),
            None => names.restrict_length_with_random_suffix(&format!(
                "{}-{node}",
                run.metadata.name
            )),
        };
        let entry = run.status.task_runs.entry(key).or_default();
        entry.pipeline_task_name = node.to_string();
        entry.condition_checks.insert(
            name.to_string(),
            PipelineRunConditionCheckStatus {
                condition_name: register,
                status: Some(ConditionCheckStatus::from_task_run(&tr.status)),
            },
        );

        info!(condition_check = %name, task = %node, "recovered orphaned condition check");
        recovered += 1;
    }

    recovered
}

/// Register name of an orphaned condition check.
///
/// Prefers the ordinal whose register name appears inside the check's own
/// name, then the first use of that condition on the node.
fn recovered_register_name(
    spec: Option<&PipelineSpec>,
    node: &str,
    condition: &str,
    check_name: &str,
) -> String {
    let candidates: Vec<String> = spec
        .and_then(|s| s.task(node))
        .map(|t| {
            t.conditions
                .iter()
                .enumerate()
                .filter(|(_, c)| c.condition_ref == condition)
                .map(|(i, _)| register_name(condition, i))
                .collect()
        })
        .unwrap_or_default();

    candidates
        .iter()
        .find(|reg| check_name.contains(&format!("-{reg}-")))
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_else(|| register_name(condition, 0))
}

/// Write every node's observed child state into the status map.
///
/// Entries are created for nodes that have a child or a failed gate and are
/// never removed.
pub fn record_nodes(run: &mut PipelineRun, nodes: &[ResolvedNode], now: DateTime<Utc>) {
    let run_name = run.metadata.name.clone();
    for node in nodes {
        let has_checks = node.condition_checks.iter().any(|cc| cc.task_run.is_some());
        let gate_failed = node.task_run.is_none() && node.condition_checks_failed();
        let known = run.status.task_runs.contains_key(&node.task_run_name);
        if node.task_run.is_none() && !has_checks && !gate_failed && !known {
            continue;
        }

        let entry = run
            .status
            .task_runs
            .entry(node.task_run_name.clone())
            .or_default();
        entry.pipeline_task_name = node.name().to_string();

        if let Some(tr) = &node.task_run {
            entry.status = Some(tr.status.clone());
        } else if gate_failed {
            let mut status = entry.status.clone().unwrap_or_default();
            set_condition(
                &mut status.conditions,
                StatusCondition::succeeded(
                    ConditionStatus::False,
                    Reason::ConditionCheckFailed.as_str(),
                    format!(
                        "ConditionChecks failed for Task {} in PipelineRun {run_name}",
                        node.task_run_name
                    ),
                    now,
                ),
            );
            entry.status = Some(status);
        }

        for cc in &node.condition_checks {
            if let Some(tr) = &cc.task_run {
                entry.condition_checks.insert(
                    cc.name.clone(),
                    PipelineRunConditionCheckStatus {
                        condition_name: cc.condition.register_name.clone(),
                        status: Some(ConditionCheckStatus::from_task_run(&tr.status)),
                    },
                );
            }
        }
    }
}

/// Derive the run condition from node states; fills pipeline results on
/// success.
pub fn aggregate(
    run: &mut PipelineRun,
    graph: &DagGraph,
    nodes: &[ResolvedNode],
    spec: &PipelineSpec,
    now: DateTime<Utc>,
) {
    let states = node_states(nodes);
    let readiness = Readiness::new(graph, &states);
    let summary = readiness.summary();

    let first_in = |state: NodeState| {
        nodes
            .iter()
            .find(|n| n.state() == state)
            .map(|n| n.task_run_name.clone())
    };

    if let Some(name) = first_in(NodeState::Cancelled) {
        set_run_condition(
            run,
            ConditionStatus::False,
            Reason::Cancelled,
            format!("TaskRun {name} has cancelled"),
            now,
        );
    } else if let Some(name) = first_in(NodeState::Failed) {
        set_run_condition(
            run,
            ConditionStatus::False,
            Reason::Failed,
            format!("TaskRun {name} has failed"),
            now,
        );
    } else if summary.incomplete > 0 {
        set_run_condition(run, ConditionStatus::Unknown, Reason::Running, MSG_RUNNING, now);
    } else {
        let message = if summary.skipped > 0 {
            format!(
                "Tasks Completed: {}, Skipped: {}",
                summary.succeeded, summary.skipped
            )
        } else {
            MSG_ALL_COMPLETED.to_string()
        };
        set_run_condition(run, ConditionStatus::True, Reason::Succeeded, message, now);
        run.status.pipeline_results = pipeline_results(&spec.results, &result_lookup(nodes));
    }

    if run.is_done() {
        info!(
            run = %run.metadata.key(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            skipped = summary.skipped,
            "pipeline run finished"
        );
    }
}
