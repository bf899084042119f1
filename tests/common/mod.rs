#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};

use rundag::api::{ConditionStatus, PipelineRun, TaskRun, TaskRunStatus, labels};
use rundag::clock::FixedClock;
use rundag::config::ReconcilerConfig;
use rundag::reconciler::{ReconcileError, Reconciler, SequentialNameGenerator};
use rundag::store::{Action, MemoryStore, Objects, Verb};

pub use rundag_test_utils::builders::*;
pub use rundag_test_utils::{init_tracing, with_timeout};

pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// A store, a fixed clock and a deterministic reconciler over them.
pub struct Fixture {
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub reconciler: Reconciler,
}

impl Fixture {
    pub fn new(objects: Objects) -> Self {
        Self::with_config(objects, ReconcilerConfig::default())
    }

    pub fn with_config(objects: Objects, config: ReconcilerConfig) -> Self {
        init_tracing();
        let store = MemoryStore::from_objects(objects);
        let clock = Arc::new(FixedClock::new(epoch()));
        let reconciler = Reconciler::new(Arc::new(store.clone()), config)
            .with_clock(clock.clone())
            .with_name_generator(Arc::new(SequentialNameGenerator::new()));
        Self {
            store,
            clock,
            reconciler,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        use rundag::clock::Clock;
        self.clock.now()
    }

    pub async fn reconcile(&self, run: &str) -> Result<(), ReconcileError> {
        self.reconciler.reconcile(&format!("{NS}/{run}")).await
    }

    pub fn run(&self, name: &str) -> PipelineRun {
        self.store
            .pipeline_run(NS, name)
            .expect("pipeline run missing from store")
    }

    /// Ordinary (non condition-check) task-runs of a node.
    pub fn task_runs_of(&self, node: &str) -> Vec<TaskRun> {
        self.store
            .task_runs()
            .into_iter()
            .filter(|tr| tr.metadata.label(labels::PIPELINE_TASK) == Some(node))
            .filter(|tr| !tr.is_condition_check())
            .collect()
    }

    pub fn task_run_of(&self, node: &str) -> TaskRun {
        let mut found = self.task_runs_of(node);
        assert_eq!(found.len(), 1, "expected exactly one task-run for {node}");
        found.remove(0)
    }

    pub fn condition_checks_of(&self, node: &str) -> Vec<TaskRun> {
        self.store
            .task_runs()
            .into_iter()
            .filter(|tr| tr.metadata.label(labels::PIPELINE_TASK) == Some(node))
            .filter(TaskRun::is_condition_check)
            .collect()
    }

    /// Report a new status for a node's task-run, as the execution engine would.
    pub fn report(&self, node: &str, status: TaskRunStatus) {
        let tr = self.task_run_of(node);
        assert!(self.store.set_task_run_status(NS, &tr.metadata.name, status));
    }

    pub fn created(&self, kind: &str) -> Vec<Action> {
        self.store.actions_of(Verb::Create, kind)
    }

    pub fn run_updates(&self) -> usize {
        self.store.actions_of(Verb::Update, "PipelineRun").len()
    }
}

/// `(status, reason, message)` of the run's `Succeeded` condition.
pub fn condition(run: &PipelineRun) -> (ConditionStatus, String, String) {
    let c = run.succeeded().expect("run has no Succeeded condition");
    (c.status, c.reason.clone(), c.message.clone())
}

/// Objects for a simple `a -> b` pipeline on task `hello`.
pub fn two_step_objects() -> Objects {
    Objects {
        pipelines: vec![
            PipelineBuilder::new("pipe")
                .task(NodeBuilder::new("a", "hello").build())
                .task(NodeBuilder::new("b", "hello").after("a").build())
                .build(),
        ],
        tasks: vec![TaskBuilder::new("hello").build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    }
}
