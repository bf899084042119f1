// src/reconciler/cancel.rs

//! Cancellation of in-flight children, for explicit cancellation and timeouts.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::api::{ConditionStatus, PipelineRun, Reason, TaskRun};
use crate::reconciler::ReconcileError;
use crate::reconciler::state::ResolvedNode;
use crate::reconciler::status::{record_nodes, refresh_known_children, set_run_condition};
use crate::store::Store;
use crate::types::format_duration;

/// Patch every named child; returns one message per failed patch.
///
/// A child that is already gone counts as cancelled.
async fn cancel_all(store: &dyn Store, namespace: &str, names: &[String]) -> Vec<String> {
    let mut failures = Vec::new();
    for name in names {
        match store.cancel_task_run(namespace, name).await {
            Ok(_) => info!(task_run = %name, "requested task-run cancellation"),
            Err(e) if e.is_not_found() => {
                info!(task_run = %name, "task-run already gone; nothing to cancel")
            }
            Err(e) => {
                warn!(task_run = %name, error = %e, "failed to cancel task-run");
                failures.push(format!("{name}: {e}"));
            }
        }
    }
    failures
}

fn couldnt_cancel(
    run: &mut PipelineRun,
    failures: Vec<String>,
    now: DateTime<Utc>,
) -> ReconcileError {
    let name = run.metadata.name.clone();
    set_run_condition(
        run,
        ConditionStatus::Unknown,
        Reason::CouldntCancel,
        format!(
            "PipelineRun \"{name}\" was cancelled but had errors trying to cancel TaskRuns: {}",
            failures.join(", ")
        ),
        now,
    );
    ReconcileError::CouldntCancel {
        run: run.metadata.key(),
        failures,
    }
}

/// Handle a run whose spec requests cancellation.
///
/// Targets every child named in the status map or found by label that has
/// not finished and has not already been asked to stop.
pub async fn cancel_run(
    store: &dyn Store,
    run: &mut PipelineRun,
    children: &BTreeMap<String, TaskRun>,
    now: DateTime<Utc>,
) -> Result<(), ReconcileError> {
    refresh_known_children(run, children);

    let mut targets: Vec<String> = children
        .values()
        .filter(|tr| !tr.is_done() && !tr.is_cancel_requested())
        .map(|tr| tr.metadata.name.clone())
        .collect();
    for (name, entry) in &run.status.task_runs {
        let recorded_done = entry.status.as_ref().is_some_and(|s| s.is_done());
        if !children.contains_key(name) && !recorded_done && entry.status.is_some() {
            targets.push(name.clone());
        }
        for (cc_name, cc) in &entry.condition_checks {
            let done = cc.status.as_ref().is_some_and(|s| s.is_done());
            if !children.contains_key(cc_name) && !done {
                targets.push(cc_name.clone());
            }
        }
    }
    targets.sort();
    targets.dedup();

    let failures = cancel_all(store, &run.metadata.namespace, &targets).await;
    if !failures.is_empty() {
        return Err(couldnt_cancel(run, failures, now));
    }

    let name = run.metadata.name.clone();
    set_run_condition(
        run,
        ConditionStatus::False,
        Reason::Cancelled,
        format!("PipelineRun \"{name}\" was cancelled"),
        now,
    );
    info!(run = %run.metadata.key(), cancelled = targets.len(), "pipeline run cancelled");
    Ok(())
}

/// Handle a run past its timeout: stop in-flight children, create nothing.
pub async fn time_out_run(
    store: &dyn Store,
    run: &mut PipelineRun,
    nodes: &[ResolvedNode],
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<(), ReconcileError> {
    record_nodes(run, nodes, now);

    let targets: Vec<String> = nodes
        .iter()
        .flat_map(ResolvedNode::in_flight)
        .filter(|tr| !tr.is_cancel_requested())
        .map(|tr| tr.metadata.name.clone())
        .collect();

    let failures = cancel_all(store, &run.metadata.namespace, &targets).await;
    if !failures.is_empty() {
        return Err(couldnt_cancel(run, failures, now));
    }

    let name = run.metadata.name.clone();
    set_run_condition(
        run,
        ConditionStatus::False,
        Reason::TimedOut,
        format!(
            "PipelineRun \"{name}\" failed to finish within \"{}\"",
            format_duration(timeout)
        ),
        now,
    );
    warn!(run = %run.metadata.key(), timeout = %format_duration(timeout), "pipeline run timed out");
    Ok(())
}
