mod common;
use crate::common::*;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use rundag::api::{ConditionStatus, labels};
use rundag::config::ReconcilerConfig;
use rundag::controller::{Controller, ControllerOptions};
use rundag::reconciler::{Reconciler, SequentialNameGenerator};
use rundag::store::{MemoryStore, Objects, Verb};

type TestResult = Result<(), Box<dyn Error>>;

fn fast_config() -> ReconcilerConfig {
    let mut config = ReconcilerConfig::default();
    config.controller.backoff_base = Duration::from_millis(1);
    config.controller.backoff_max = Duration::from_millis(5);
    config.controller.resync_interval = Duration::from_millis(50);
    config
}

fn controller(store: &MemoryStore, exit_when_idle: bool) -> Controller {
    let reconciler = Reconciler::new(Arc::new(store.clone()), fast_config())
        .with_name_generator(Arc::new(SequentialNameGenerator::new()));
    Controller::new(Arc::new(reconciler), ControllerOptions { exit_when_idle })
}

fn node_of(store: &MemoryStore, node: &str) -> Option<String> {
    store
        .task_runs()
        .into_iter()
        .find(|tr| tr.metadata.label(labels::PIPELINE_TASK) == Some(node))
        .map(|tr| tr.metadata.name)
}

/// Poll until `f` returns something.
async fn eventually<T>(mut f: impl FnMut() -> Option<T>) -> T {
    loop {
        if let Some(v) = f() {
            return v;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn idle_mode_runs_one_round_and_exits() -> TestResult {
    init_tracing();
    let store = MemoryStore::from_objects(two_step_objects());

    with_timeout(controller(&store, true).run()).await?;

    assert_eq!(store.actions_of(Verb::Create, "TaskRun").len(), 1);
    assert!(node_of(&store, "a").is_some());
    let run = store.pipeline_run(NS, "run").ok_or("run missing")?;
    assert_eq!(condition(&run).0, ConditionStatus::Unknown);
    Ok(())
}

#[tokio::test]
async fn idle_mode_skips_finished_runs() -> TestResult {
    init_tracing();
    let mut objects = two_step_objects();
    objects.pipeline_runs = vec![RunBuilder::new("run", "missing-pipeline").build()];
    let store = MemoryStore::from_objects(objects);

    with_timeout(controller(&store, true).run()).await?;
    let updates = store.actions_of(Verb::Update, "PipelineRun").len();
    assert_eq!(updates, 1);

    // A second controller finds nothing to do.
    store.clear_actions();
    with_timeout(controller(&store, true).run()).await?;
    assert!(store.actions().is_empty());
    Ok(())
}

#[tokio::test]
async fn idle_mode_gives_up_on_persistent_failures() -> TestResult {
    init_tracing();
    let store = MemoryStore::from_objects(two_step_objects());
    store.fail_on(Verb::Create, "TaskRun", "admission webhook down");

    with_timeout(controller(&store, true).run()).await?;

    assert!(store.task_runs().is_empty());
    let run = store.pipeline_run(NS, "run").ok_or("run missing")?;
    assert_eq!(condition(&run).0, ConditionStatus::Unknown);
    Ok(())
}

#[tokio::test]
async fn watch_events_drive_run_to_completion() -> TestResult {
    init_tracing();
    let store = MemoryStore::from_objects(Objects {
        pipeline_runs: vec![
            RunBuilder::new("run", "pipe").build(),
            RunBuilder::new("other", "pipe").build(),
        ],
        ..two_step_objects()
    });
    let handle = tokio::spawn(controller(&store, false).run());

    with_timeout(async {
        for run in ["run", "other"] {
            for node in ["a", "b"] {
                let name = eventually(|| {
                    store
                        .task_runs()
                        .into_iter()
                        .find(|tr| {
                            tr.metadata.label(labels::PIPELINE_RUN) == Some(run)
                                && tr.metadata.label(labels::PIPELINE_TASK) == Some(node)
                        })
                        .map(|tr| tr.metadata.name)
                })
                .await;
                store.set_task_run_status(NS, &name, succeeded(chrono::Utc::now()));
            }
            eventually(|| {
                store
                    .pipeline_run(NS, run)
                    .filter(|r| r.is_done())
                    .map(|_| ())
            })
            .await;
        }
    })
    .await;
    handle.abort();

    for run in ["run", "other"] {
        let run = store.pipeline_run(NS, run).ok_or("run missing")?;
        let (status, reason, _) = condition(&run);
        assert_eq!(status, ConditionStatus::True);
        assert_eq!(reason, "Succeeded");
    }
    assert_eq!(store.actions_of(Verb::Create, "TaskRun").len(), 4);
    Ok(())
}

#[tokio::test]
async fn transient_failure_is_retried_with_backoff() -> TestResult {
    init_tracing();
    let store = MemoryStore::from_objects(two_step_objects());
    store.fail_next(Verb::Create, "TaskRun", "blip");

    with_timeout(controller(&store, true).run()).await?;

    assert!(node_of(&store, "a").is_some(), "the retry must create the task-run");
    Ok(())
}
