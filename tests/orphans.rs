mod common;
use crate::common::*;

use std::error::Error;

use rundag::api::{Param, PipelineRunTaskRunStatus};
use rundag::store::Objects;

type TestResult = Result<(), Box<dyn Error>>;

fn orphan(name: &str, node: &str) -> TaskRunBuilder {
    TaskRunBuilder::new(name, "run", node).status(running(epoch()))
}

#[tokio::test]
async fn labelled_orphan_is_merged_not_duplicated() -> TestResult {
    let mut objects = two_step_objects();
    objects.task_runs = vec![orphan("run-a-x7k2p", "a").build()];
    let fx = Fixture::new(objects);

    fx.reconcile("run").await?;

    assert!(fx.created("TaskRun").is_empty());
    let run = fx.run("run");
    let entry = run
        .status
        .task_runs
        .get("run-a-x7k2p")
        .ok_or("orphan not recorded")?;
    assert_eq!(entry.pipeline_task_name, "a");
    assert!(entry.status.is_some());

    fx.report("a", succeeded(fx.now()));
    fx.reconcile("run").await?;
    assert_eq!(fx.task_runs_of("b").len(), 1);
    Ok(())
}

#[tokio::test]
async fn stale_entry_is_rekeyed_to_found_orphan() -> TestResult {
    let mut objects = two_step_objects();
    let mut run = RunBuilder::new("run", "pipe").build();
    run.status.task_runs.insert(
        "run-a-lost1".to_string(),
        PipelineRunTaskRunStatus {
            pipeline_task_name: "a".to_string(),
            ..Default::default()
        },
    );
    objects.pipeline_runs = vec![run];
    objects.task_runs = vec![orphan("run-a-found", "a").build()];
    let fx = Fixture::new(objects);

    fx.reconcile("run").await?;

    let run = fx.run("run");
    assert!(run.status.task_runs.contains_key("run-a-found"));
    assert!(!run.status.task_runs.contains_key("run-a-lost1"));
    assert!(fx.created("TaskRun").is_empty());
    Ok(())
}

#[tokio::test]
async fn orphaned_condition_check_is_recovered() -> TestResult {
    let check = orphan("run-a-q9z8w-always-0-m3n4v", "a")
        .condition_check("always")
        .build();

    let fx = Fixture::new(Objects {
        pipelines: vec![
            PipelineBuilder::new("pipe")
                .task(
                    NodeBuilder::new("a", "hello")
                        .condition("always", vec![Param::new("path", "x")])
                        .build(),
                )
                .build(),
        ],
        tasks: vec![TaskBuilder::new("hello").build()],
        conditions: vec![ConditionBuilder::new("always").param("path").build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        task_runs: vec![check],
        ..Objects::default()
    });

    fx.reconcile("run").await?;

    assert!(fx.created("TaskRun").is_empty(), "the orphaned check must be reused");
    let run = fx.run("run");
    let (_, entry) = run.status.task_run_for("a").ok_or("no entry for a")?;
    let cc = entry
        .condition_checks
        .get("run-a-q9z8w-always-0-m3n4v")
        .ok_or("check not recovered")?;
    assert_eq!(cc.condition_name, "always-0");

    fx.store
        .set_task_run_status(NS, "run-a-q9z8w-always-0-m3n4v", succeeded(fx.now()));
    fx.reconcile("run").await?;
    assert_eq!(fx.task_runs_of("a").len(), 1);
    assert_eq!(fx.condition_checks_of("a").len(), 1);
    Ok(())
}

#[tokio::test]
async fn deleted_finished_child_is_not_recreated() -> TestResult {
    let fx = Fixture::new(two_step_objects());
    fx.reconcile("run").await?;
    let a = fx.task_run_of("a");
    fx.report("a", succeeded(fx.now()));
    fx.reconcile("run").await?;

    fx.store.remove_task_run(NS, &a.metadata.name);
    fx.reconcile("run").await?;

    assert!(fx.task_runs_of("a").is_empty());
    assert_eq!(fx.created("TaskRun").len(), 2);

    fx.report("b", succeeded(fx.now()));
    fx.reconcile("run").await?;
    let run = fx.run("run");
    assert_eq!(condition(&run).1, "Succeeded");
    let recorded = run.status.task_runs[&a.metadata.name]
        .status
        .as_ref()
        .ok_or("recorded status lost")?;
    assert!(recorded.is_successful());
    Ok(())
}

#[tokio::test]
async fn deleted_unfinished_child_is_recreated_under_same_name() -> TestResult {
    let fx = Fixture::new(two_step_objects());
    fx.reconcile("run").await?;
    let a = fx.task_run_of("a");

    fx.store.remove_task_run(NS, &a.metadata.name);
    fx.reconcile("run").await?;

    assert_eq!(fx.created("TaskRun").len(), 2);
    assert_eq!(fx.task_run_of("a").metadata.name, a.metadata.name);
    Ok(())
}

#[tokio::test]
async fn owned_child_with_the_generated_name_is_adopted() -> TestResult {
    let mut objects = two_step_objects();
    objects.task_runs = vec![orphan("run-a-bbbbb", "a").unlabelled().build()];
    let fx = Fixture::new(objects);

    fx.reconcile("run").await?;

    assert!(fx.created("TaskRun").is_empty());
    assert!(fx.run("run").status.task_runs.contains_key("run-a-bbbbb"));
    Ok(())
}
