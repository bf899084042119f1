// src/reconciler/timeout.rs

//! Wall-clock timeout evaluation; there is no timer, only comparison on each pass.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::api::{PipelineRun, PipelineTask};
use crate::config::ReconcilerConfig;

/// Floor for a task-run created after the run's budget is used up.
const MIN_TASK_RUN_TIMEOUT: Duration = Duration::from_secs(1);

/// Declared run timeout, or the configured default. Zero means none.
pub fn run_timeout(run: &PipelineRun, config: &ReconcilerConfig) -> Duration {
    run.spec.timeout.unwrap_or(config.defaults.timeout)
}

pub fn elapsed(run: &PipelineRun, now: DateTime<Utc>) -> Duration {
    run.status
        .start_time
        .and_then(|start| (now - start).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

pub fn is_timed_out(run: &PipelineRun, config: &ReconcilerConfig, now: DateTime<Utc>) -> bool {
    let timeout = run_timeout(run, config);
    if timeout.is_zero() || run.status.start_time.is_none() {
        return false;
    }
    elapsed(run, now) >= timeout
}

/// Timeout for a new task-run of `node`.
///
/// The run's remaining budget (at least one second), lowered to the node's
/// own timeout when that is set and smaller. Without a run timeout the node
/// timeout applies, or zero.
pub fn task_run_timeout(
    run: &PipelineRun,
    node: &PipelineTask,
    config: &ReconcilerConfig,
    now: DateTime<Utc>,
) -> Duration {
    let node_timeout = node.timeout.filter(|t| !t.is_zero());
    let timeout = run_timeout(run, config);
    if timeout.is_zero() {
        return node_timeout.unwrap_or(Duration::ZERO);
    }

    let remaining = timeout
        .checked_sub(elapsed(run, now))
        .filter(|r| *r >= MIN_TASK_RUN_TIMEOUT)
        .unwrap_or(MIN_TASK_RUN_TIMEOUT);

    match node_timeout {
        Some(t) if t < remaining => t,
        _ => remaining,
    }
}
