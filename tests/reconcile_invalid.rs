mod common;
use crate::common::*;

use std::error::Error;

use rundag::api::{ConditionStatus, Reason, ResourceType, WorkspaceSource};
use rundag::store::{Objects, Verb};

type TestResult = Result<(), Box<dyn Error>>;

/// Reconcile once and assert the run ended with `reason` without creating children.
async fn assert_fails_with(objects: Objects, reason: Reason) -> TestResult {
    let fx = Fixture::new(objects);

    fx.reconcile("run").await?;

    let run = fx.run("run");
    let (status, got, message) = condition(&run);
    assert_eq!(status, ConditionStatus::False, "message: {message}");
    assert_eq!(got, reason.as_str(), "message: {message}");
    assert!(!message.is_empty());
    assert_eq!(run.status.completion_time, Some(fx.now()));
    assert!(fx.created("TaskRun").is_empty());

    // A failed run stays failed and is not touched again.
    fx.store.clear_actions();
    fx.reconcile("run").await?;
    assert!(fx.store.actions().is_empty());
    Ok(())
}

fn single_node(node: rundag::api::PipelineTask) -> PipelineBuilder {
    PipelineBuilder::new("pipe").task(node)
}

#[tokio::test]
async fn missing_pipeline() -> TestResult {
    let objects = Objects {
        pipeline_runs: vec![RunBuilder::new("run", "does-not-exist").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::CouldntGetPipeline).await
}

#[tokio::test]
async fn missing_task() -> TestResult {
    let objects = Objects {
        pipelines: vec![single_node(NodeBuilder::new("a", "nope").build()).build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::CouldntGetTask).await
}

#[tokio::test]
async fn missing_cluster_task() -> TestResult {
    // A namespaced task of the same name does not satisfy a cluster reference.
    let objects = Objects {
        pipelines: vec![single_node(NodeBuilder::cluster("a", "hello").build()).build()],
        tasks: vec![TaskBuilder::new("hello").build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::CouldntGetTask).await
}

#[tokio::test]
async fn missing_condition() -> TestResult {
    let objects = Objects {
        pipelines: vec![
            single_node(
                NodeBuilder::new("a", "hello")
                    .condition("always", Vec::new())
                    .build(),
            )
            .build(),
        ],
        tasks: vec![TaskBuilder::new("hello").build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::CouldntGetCondition).await
}

#[tokio::test]
async fn unbound_declared_resource() -> TestResult {
    let pipeline = single_node(NodeBuilder::new("a", "build").input("src", "repo", &[]).build())
        .resource("repo", ResourceType::Git)
        .build();
    let objects = Objects {
        pipelines: vec![pipeline],
        tasks: vec![TaskBuilder::new("build").input("src", ResourceType::Git).build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::InvalidBindings).await
}

#[tokio::test]
async fn bound_resource_does_not_exist() -> TestResult {
    let pipeline = single_node(NodeBuilder::new("a", "build").input("src", "repo", &[]).build())
        .resource("repo", ResourceType::Git)
        .build();
    let objects = Objects {
        pipelines: vec![pipeline],
        tasks: vec![TaskBuilder::new("build").input("src", ResourceType::Git).build()],
        pipeline_runs: vec![
            RunBuilder::new("run", "pipe")
                .resource_ref("repo", "missing-repo")
                .build(),
        ],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::CouldntGetResource).await
}

#[tokio::test]
async fn bound_resource_has_wrong_type() -> TestResult {
    let pipeline = single_node(NodeBuilder::new("a", "build").input("src", "repo", &[]).build())
        .resource("repo", ResourceType::Git)
        .build();
    let objects = Objects {
        pipelines: vec![pipeline],
        tasks: vec![TaskBuilder::new("build").input("src", ResourceType::Git).build()],
        pipeline_resources: vec![pipeline_resource("an-image", ResourceType::Image)],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").resource_ref("repo", "an-image").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::InvalidBindings).await
}

#[tokio::test]
async fn required_param_not_provided() -> TestResult {
    let pipeline = single_node(NodeBuilder::new("a", "hello").build())
        .param("revision", None)
        .build();
    let objects = Objects {
        pipelines: vec![pipeline],
        tasks: vec![TaskBuilder::new("hello").build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::FailedValidation).await
}

#[tokio::test]
async fn param_type_mismatch() -> TestResult {
    let pipeline = single_node(NodeBuilder::new("a", "hello").build())
        .array_param("flags")
        .build();
    let objects = Objects {
        pipelines: vec![pipeline],
        tasks: vec![TaskBuilder::new("hello").build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").param("flags", "not-a-list").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::ParameterTypeMismatch).await
}

#[tokio::test]
async fn dependency_cycle() -> TestResult {
    let pipeline = PipelineBuilder::new("pipe")
        .task(NodeBuilder::new("a", "hello").after("b").build())
        .task(NodeBuilder::new("b", "hello").after("a").build())
        .build();
    let objects = Objects {
        pipelines: vec![pipeline],
        tasks: vec![TaskBuilder::new("hello").build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::InvalidGraph).await
}

#[tokio::test]
async fn unknown_run_after_target() -> TestResult {
    let objects = Objects {
        pipelines: vec![single_node(NodeBuilder::new("a", "hello").after("ghost").build()).build()],
        tasks: vec![TaskBuilder::new("hello").build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::FailedValidation).await
}

#[tokio::test]
async fn unbound_workspace() -> TestResult {
    let pipeline = single_node(
        NodeBuilder::new("a", "uses-ws")
            .workspace("src", "shared", "")
            .build(),
    )
    .workspace("shared")
    .build();
    let objects = Objects {
        pipelines: vec![pipeline],
        tasks: vec![TaskBuilder::new("uses-ws").workspace("src").build()],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    };
    assert_fails_with(objects, Reason::InvalidWorkspaceBindings).await
}

#[tokio::test]
async fn bound_workspace_is_accepted() -> TestResult {
    let pipeline = single_node(
        NodeBuilder::new("a", "uses-ws")
            .workspace("src", "shared", "")
            .build(),
    )
    .workspace("shared")
    .build();
    let fx = Fixture::new(Objects {
        pipelines: vec![pipeline],
        tasks: vec![TaskBuilder::new("uses-ws").workspace("src").build()],
        pipeline_runs: vec![
            RunBuilder::new("run", "pipe")
                .workspace("shared", "", WorkspaceSource::EmptyDir)
                .build(),
        ],
        ..Objects::default()
    });

    fx.reconcile("run").await?;
    assert_eq!(fx.created("TaskRun").len(), 1);
    Ok(())
}

#[tokio::test]
async fn producer_finished_without_referenced_result() -> TestResult {
    let pipeline = PipelineBuilder::new("pipe")
        .task(NodeBuilder::new("a", "produce").build())
        .task(
            NodeBuilder::new("b", "consume")
                .param("input", "$(tasks.a.results.x)")
                .build(),
        )
        .build();
    let fx = Fixture::new(Objects {
        pipelines: vec![pipeline],
        tasks: vec![
            TaskBuilder::new("produce").result("x").build(),
            TaskBuilder::new("consume").param("input").build(),
        ],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").build()],
        ..Objects::default()
    });

    fx.reconcile("run").await?;
    fx.report("a", succeeded(fx.now()));
    fx.reconcile("run").await?;

    let (status, reason, message) = condition(&fx.run("run"));
    assert_eq!(status, ConditionStatus::False);
    assert_eq!(reason, Reason::InvalidTaskResultReference.as_str());
    assert!(message.contains("could not find result with name x for task a"), "{message}");
    assert!(fx.task_runs_of("b").is_empty());
    Ok(())
}

#[tokio::test]
async fn transient_create_failure_is_retried() -> TestResult {
    let fx = Fixture::new(two_step_objects());
    fx.store.fail_on(Verb::Create, "TaskRun", "etcd unavailable");

    let err = fx.reconcile("run").await;
    assert!(err.is_err(), "a transient failure must surface for requeue");

    let (status, _, _) = condition(&fx.run("run"));
    assert_eq!(status, ConditionStatus::Unknown);
    assert!(fx.run("run").status.completion_time.is_none());
    assert!(fx.store.task_runs().is_empty());

    fx.store.clear_failures();
    fx.reconcile("run").await?;
    assert_eq!(fx.task_runs_of("a").len(), 1);
    Ok(())
}
