// src/dag/readiness.rs

//! Pure readiness evaluation over a [`DagGraph`] and observed node states.

use std::cell::RefCell;
use std::collections::BTreeMap;

use tracing::debug;

use crate::dag::DagGraph;

/// Observed state of one node in the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Nothing created yet (or only condition checks that have not finished).
    Pending,
    /// A task-run exists and has not finished, including retry attempts.
    Running,
    Succeeded,
    /// Failed with no retry budget left.
    Failed,
    Cancelled,
    /// One of the node's condition checks failed; the task never runs.
    ConditionFailed,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Succeeded
                | NodeState::Failed
                | NodeState::Cancelled
                | NodeState::ConditionFailed
        )
    }
}

/// Counts used for the run's condition message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub incomplete: usize,
}

/// Read-only view answering "what may run next?" for one pass.
pub struct Readiness<'a> {
    graph: &'a DagGraph,
    states: &'a BTreeMap<String, NodeState>,
    skipped: RefCell<BTreeMap<String, bool>>,
}

impl<'a> Readiness<'a> {
    pub fn new(graph: &'a DagGraph, states: &'a BTreeMap<String, NodeState>) -> Self {
        Self {
            graph,
            states,
            skipped: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn state_of(&self, name: &str) -> NodeState {
        self.states.get(name).copied().unwrap_or(NodeState::Pending)
    }

    /// A node is skipped when its own condition checks failed, or when it
    /// has not started and some predecessor failed, was cancelled or was
    /// itself skipped.
    pub fn is_skipped(&self, name: &str) -> bool {
        if let Some(known) = self.skipped.borrow().get(name) {
            return *known;
        }

        let skipped = match self.state_of(name) {
            NodeState::ConditionFailed => true,
            NodeState::Pending => self.graph.dependencies_of(name).iter().any(|dep| {
                matches!(self.state_of(dep), NodeState::Failed | NodeState::Cancelled)
                    || self.is_skipped(dep)
            }),
            _ => false,
        };

        self.skipped.borrow_mut().insert(name.to_string(), skipped);
        skipped
    }

    /// Pending, non-skipped nodes whose predecessors all succeeded, in
    /// definition order.
    pub fn schedulable(&self) -> Vec<String> {
        self.graph
            .tasks()
            .filter(|name| self.state_of(name) == NodeState::Pending)
            .filter(|name| !self.is_skipped(name))
            .filter(|name| {
                self.graph
                    .dependencies_of(name)
                    .iter()
                    .all(|dep| self.state_of(dep) == NodeState::Succeeded)
            })
            .map(|name| {
                debug!(task = %name, "predecessors satisfied; node is schedulable");
                name.to_string()
            })
            .collect()
    }

    pub fn summary(&self) -> ReadinessSummary {
        let mut summary = ReadinessSummary::default();
        for name in self.graph.tasks() {
            match self.state_of(name) {
                NodeState::Succeeded => summary.succeeded += 1,
                NodeState::Failed => summary.failed += 1,
                NodeState::Cancelled => summary.cancelled += 1,
                NodeState::ConditionFailed => summary.skipped += 1,
                NodeState::Pending if self.is_skipped(name) => summary.skipped += 1,
                NodeState::Pending | NodeState::Running => summary.incomplete += 1,
            }
        }
        summary
    }

    /// Every node is terminal or skipped.
    pub fn all_terminal(&self) -> bool {
        self.summary().incomplete == 0
    }
}
