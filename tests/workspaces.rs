mod common;
use crate::common::*;

use std::error::Error;

use rundag::api::{
    ObjectMeta, PersistentVolumeClaimSpec, ResourceSource, ResourceType, VolumeClaimTemplate,
    WorkspaceSource,
};
use rundag::store::{Objects, Verb};

type TestResult = Result<(), Box<dyn Error>>;

fn template() -> VolumeClaimTemplate {
    VolumeClaimTemplate {
        metadata: ObjectMeta::default(),
        spec: PersistentVolumeClaimSpec {
            access_modes: vec!["ReadWriteOnce".to_string()],
            storage: "1Gi".to_string(),
            storage_class: None,
        },
    }
}

fn workspace_objects(source: WorkspaceSource) -> Objects {
    Objects {
        pipelines: vec![
            PipelineBuilder::new("pipe")
                .workspace("shared")
                .task(
                    NodeBuilder::new("a", "writer")
                        .workspace("out", "shared", "build")
                        .build(),
                )
                .build(),
        ],
        tasks: vec![TaskBuilder::new("writer").workspace("out").build()],
        pipeline_runs: vec![
            RunBuilder::new("run", "pipe")
                .workspace("shared", "ci", source)
                .build(),
        ],
        ..Objects::default()
    }
}

#[tokio::test]
async fn claim_template_is_provisioned_and_bound() -> TestResult {
    let fx = Fixture::new(workspace_objects(WorkspaceSource::VolumeClaimTemplate(template())));

    fx.reconcile("run").await?;

    let pvcs = fx.store.pvcs();
    assert_eq!(pvcs.len(), 1);
    let pvc = &pvcs[0];
    assert_eq!(pvc.metadata.name, "pvc-shared-run");
    assert_eq!(pvc.metadata.namespace, NS);
    assert_eq!(pvc.spec.storage, "1Gi");
    assert!(pvc.metadata.is_controlled_by(&fx.run("run").owner_reference()));

    let a = fx.task_run_of("a");
    assert_eq!(a.spec.workspaces.len(), 1);
    let ws = &a.spec.workspaces[0];
    assert_eq!(ws.name, "out");
    assert_eq!(ws.sub_path, "ci/build");
    assert_eq!(
        ws.source,
        WorkspaceSource::PersistentVolumeClaim {
            claim_name: "pvc-shared-run".to_string()
        }
    );
    assert!(a.spec.artifact_storage.is_none());
    Ok(())
}

#[tokio::test]
async fn named_template_prefixes_claim() -> TestResult {
    let mut tmpl = template();
    tmpl.metadata.name = "cache".to_string();
    let fx = Fixture::new(workspace_objects(WorkspaceSource::VolumeClaimTemplate(tmpl)));

    fx.reconcile("run").await?;

    assert_eq!(fx.store.pvcs()[0].metadata.name, "cache-shared-run");
    Ok(())
}

#[tokio::test]
async fn existing_claim_is_not_recreated() -> TestResult {
    let fx = Fixture::new(workspace_objects(WorkspaceSource::VolumeClaimTemplate(template())));

    fx.reconcile("run").await?;
    fx.reconcile("run").await?;

    assert_eq!(fx.store.actions_of(Verb::Create, "PersistentVolumeClaim").len(), 1);
    Ok(())
}

#[tokio::test]
async fn plain_sources_pass_through() -> TestResult {
    let fx = Fixture::new(workspace_objects(WorkspaceSource::ConfigMap {
        name: "settings".to_string(),
    }));

    fx.reconcile("run").await?;

    assert!(fx.store.pvcs().is_empty());
    let a = fx.task_run_of("a");
    assert_eq!(
        a.spec.workspaces[0].source,
        WorkspaceSource::ConfigMap {
            name: "settings".to_string()
        }
    );
    Ok(())
}

/// `a` builds an image that `b` consumes through `from`.
fn artifact_objects() -> Objects {
    Objects {
        pipelines: vec![
            PipelineBuilder::new("pipe")
                .resource("img", ResourceType::Image)
                .resource("repo", ResourceType::Git)
                .task(
                    NodeBuilder::new("a", "build")
                        .input("src", "repo", &[])
                        .output("image", "img")
                        .build(),
                )
                .task(
                    NodeBuilder::new("b", "deploy")
                        .input("image", "img", &["a"])
                        .build(),
                )
                .build(),
        ],
        tasks: vec![
            TaskBuilder::new("build")
                .input("src", ResourceType::Git)
                .output("image", ResourceType::Image)
                .build(),
            TaskBuilder::new("deploy")
                .input("image", ResourceType::Image)
                .build(),
        ],
        pipeline_resources: vec![
            pipeline_resource("my-image", ResourceType::Image),
            pipeline_resource("my-repo", ResourceType::Git),
        ],
        pipeline_runs: vec![
            RunBuilder::new("run", "pipe")
                .resource_ref("img", "my-image")
                .resource_ref("repo", "my-repo")
                .build(),
        ],
        ..Objects::default()
    }
}

#[tokio::test]
async fn from_links_share_artifact_claim() -> TestResult {
    let fx = Fixture::new(artifact_objects());

    fx.reconcile("run").await?;

    let pvcs = fx.store.pvcs();
    assert_eq!(pvcs.len(), 1);
    assert_eq!(pvcs[0].metadata.name, "run-pvc");
    assert_eq!(pvcs[0].spec.storage, "5Gi");
    assert_eq!(pvcs[0].spec.access_modes, vec!["ReadWriteOnce".to_string()]);

    assert!(fx.task_runs_of("b").is_empty(), "from implies ordering");
    let a = fx.task_run_of("a");
    let storage = a.spec.artifact_storage.as_ref().ok_or("producer lacks artifact storage")?;
    assert_eq!(storage.claim_name, "run-pvc");
    assert_eq!(storage.base_path, "/pvc");
    assert_eq!(a.spec.resources.outputs[0].paths, vec!["/pvc/a/image".to_string()]);
    assert_eq!(
        a.spec.resources.outputs[0].resource,
        ResourceSource::Ref {
            name: "my-image".to_string()
        }
    );
    assert_eq!(
        a.spec.resources.inputs[0].resource,
        ResourceSource::Ref {
            name: "my-repo".to_string()
        }
    );

    fx.report("a", succeeded(fx.now()));
    fx.reconcile("run").await?;

    let b = fx.task_run_of("b");
    assert_eq!(b.spec.resources.inputs[0].name, "image");
    assert_eq!(b.spec.resources.inputs[0].paths, vec!["/pvc/a/image".to_string()]);
    assert!(b.spec.artifact_storage.is_some());
    Ok(())
}

#[tokio::test]
async fn artifact_base_path_comes_from_config() -> TestResult {
    let mut config = rundag::config::ReconcilerConfig::default();
    config.artifacts.base_path = "/artifacts/".to_string();
    config.artifacts.storage_class = Some("fast".to_string());
    let fx = Fixture::with_config(artifact_objects(), config);

    fx.reconcile("run").await?;

    assert_eq!(fx.store.pvcs()[0].spec.storage_class.as_deref(), Some("fast"));
    let a = fx.task_run_of("a");
    assert_eq!(a.spec.resources.outputs[0].paths, vec!["/artifacts/a/image".to_string()]);
    Ok(())
}

#[tokio::test]
async fn resources_without_from_need_no_claim() -> TestResult {
    let pipeline = PipelineBuilder::new("pipe")
        .resource("repo", ResourceType::Git)
        .task(NodeBuilder::new("a", "build").input("src", "repo", &[]).build())
        .build();
    let fx = Fixture::new(Objects {
        pipelines: vec![pipeline],
        tasks: vec![TaskBuilder::new("build").input("src", ResourceType::Git).build()],
        pipeline_resources: vec![pipeline_resource("my-repo", ResourceType::Git)],
        pipeline_runs: vec![RunBuilder::new("run", "pipe").resource_ref("repo", "my-repo").build()],
        ..Objects::default()
    });

    fx.reconcile("run").await?;

    assert!(fx.store.pvcs().is_empty());
    let a = fx.task_run_of("a");
    assert!(a.spec.artifact_storage.is_none());
    assert!(a.spec.resources.inputs[0].paths.is_empty());
    Ok(())
}
