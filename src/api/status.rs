// src/api/status.rs

//! Tri-state `Succeeded` condition shared by runs and task-runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SUCCEEDED: &str = "Succeeded";

/// Reason recorded on a task-run after its cancellation was honoured.
pub const TASK_RUN_CANCELLED: &str = "TaskRunCancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl StatusCondition {
    pub fn succeeded(
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_: SUCCEEDED.to_string(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }

    pub fn is_unknown(&self) -> bool {
        self.status == ConditionStatus::Unknown
    }
}

pub fn succeeded_condition(conditions: &[StatusCondition]) -> Option<&StatusCondition> {
    conditions.iter().find(|c| c.type_ == SUCCEEDED)
}

/// Insert or replace the condition of the same type.
///
/// An identical status/reason/message leaves the existing entry (and its
/// transition time) untouched.
pub fn set_condition(conditions: &mut Vec<StatusCondition>, cond: StatusCondition) {
    match conditions.iter_mut().find(|c| c.type_ == cond.type_) {
        Some(existing)
            if existing.status == cond.status
                && existing.reason == cond.reason
                && existing.message == cond.message => {}
        Some(existing) => *existing = cond,
        None => conditions.push(cond),
    }
}

/// Reason codes written to a run's `Succeeded` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Started,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
    CouldntCancel,
    CouldntGetPipeline,
    CouldntGetTask,
    CouldntGetCondition,
    CouldntGetResource,
    InvalidBindings,
    InvalidWorkspaceBindings,
    ParameterTypeMismatch,
    FailedValidation,
    InvalidGraph,
    InvalidTaskResultReference,
    ConditionCheckFailed,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Started => "Started",
            Reason::Running => "Running",
            Reason::Succeeded => "Succeeded",
            Reason::Failed => "Failed",
            Reason::Cancelled => "PipelineRunCancelled",
            Reason::TimedOut => "PipelineRunTimeout",
            Reason::CouldntCancel => "PipelineRunCouldntCancel",
            Reason::CouldntGetPipeline => "CouldntGetPipeline",
            Reason::CouldntGetTask => "CouldntGetTask",
            Reason::CouldntGetCondition => "CouldntGetCondition",
            Reason::CouldntGetResource => "CouldntGetResource",
            Reason::InvalidBindings => "InvalidBindings",
            Reason::InvalidWorkspaceBindings => "InvalidWorkspaceBindings",
            Reason::ParameterTypeMismatch => "ParameterTypeMismatch",
            Reason::FailedValidation => "FailedValidation",
            Reason::InvalidGraph => "InvalidGraph",
            Reason::InvalidTaskResultReference => "InvalidTaskResultReference",
            Reason::ConditionCheckFailed => "ConditionCheckFailed",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_condition_keeps_transition_time_for_identical_state() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);
        let mut conds = Vec::new();

        set_condition(
            &mut conds,
            StatusCondition::succeeded(ConditionStatus::Unknown, "Running", "m", t0),
        );
        set_condition(
            &mut conds,
            StatusCondition::succeeded(ConditionStatus::Unknown, "Running", "m", t1),
        );
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].last_transition_time, t0);

        set_condition(
            &mut conds,
            StatusCondition::succeeded(ConditionStatus::True, "Succeeded", "done", t1),
        );
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].last_transition_time, t1);
        assert!(conds[0].is_true());
    }
}
