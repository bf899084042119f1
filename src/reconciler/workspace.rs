// src/reconciler/workspace.rs

//! Workspace and artifact linking.
//!
//! Maps run-level workspace bindings onto node bindings, provisions claims
//! generated from templates, and provisions the shared artifact claim that
//! carries resources between nodes linked by `from`.

use tracing::{debug, info};

use crate::api::{
    ArtifactStorage, ObjectMeta, PersistentVolumeClaim, PersistentVolumeClaimSpec, PipelineRun,
    PipelineTask, VolumeClaimTemplate, WorkspaceBinding, WorkspaceSource,
};
use crate::config::ArtifactConfig;
use crate::resolve::NodePlan;
use crate::store::{Store, StoreResult};

pub fn artifact_claim_name(run: &str) -> String {
    format!("{run}-pvc")
}

/// Claim name for a template-sourced workspace.
pub fn template_claim_name(template: &VolumeClaimTemplate, workspace: &str, run: &str) -> String {
    let prefix = if template.metadata.name.is_empty() {
        "pvc"
    } else {
        template.metadata.name.as_str()
    };
    format!("{prefix}-{workspace}-{run}")
}

/// Join sub-paths, dropping empty segments.
pub fn join_sub_paths(outer: &str, inner: &str) -> String {
    [outer, inner]
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// True when some node or condition of the run consumes a resource `from`
/// another node.
pub fn uses_artifact_storage<'a>(mut plans: impl Iterator<Item = &'a NodePlan>) -> bool {
    plans.any(|p| {
        p.inputs.iter().any(|i| !i.from.is_empty())
            || p
                .conditions
                .iter()
                .any(|c| c.resources.iter().any(|r| !r.from.is_empty()))
    })
}

/// True when this node reads from or publishes to the artifact claim.
pub fn touches_artifact_storage(plan: &NodePlan, graph_has_consumers: bool) -> bool {
    graph_has_consumers
        && (!plan.outputs.is_empty()
            || plan.inputs.iter().any(|i| !i.from.is_empty())
            || plan
                .conditions
                .iter()
                .any(|c| c.resources.iter().any(|r| !r.from.is_empty())))
}

pub fn artifact_storage(run: &PipelineRun, config: &ArtifactConfig) -> ArtifactStorage {
    ArtifactStorage {
        claim_name: artifact_claim_name(&run.metadata.name),
        base_path: config.base_path.clone(),
    }
}

/// Paths an input resource is fetched from, one per producing node.
pub fn input_paths(base_path: &str, from: &[String], input: &str) -> Vec<String> {
    from.iter()
        .map(|producer| format!("{}/{producer}/{input}", base_path.trim_end_matches('/')))
        .collect()
}

pub fn output_path(base_path: &str, node: &str, output: &str) -> String {
    format!("{}/{node}/{output}", base_path.trim_end_matches('/'))
}

/// Node workspace bindings derived from the run's bindings.
///
/// Template sources are replaced by the claim provisioned for them.
pub fn node_workspaces(run: &PipelineRun, node: &PipelineTask) -> Vec<WorkspaceBinding> {
    node.workspaces
        .iter()
        .filter_map(|ws| {
            let bound = run.spec.workspaces.iter().find(|b| b.name == ws.workspace)?;
            let source = match &bound.source {
                WorkspaceSource::VolumeClaimTemplate(template) => {
                    WorkspaceSource::PersistentVolumeClaim {
                        claim_name: template_claim_name(template, &bound.name, &run.metadata.name),
                    }
                }
                other => other.clone(),
            };
            Some(WorkspaceBinding {
                name: ws.name.clone(),
                sub_path: join_sub_paths(&bound.sub_path, &ws.sub_path),
                source,
            })
        })
        .collect()
}

/// Claims a pass needs before creating task-runs.
pub fn required_claims<'a>(
    run: &PipelineRun,
    nodes: impl Iterator<Item = &'a PipelineTask> + Clone,
    needs_artifacts: bool,
    config: &ArtifactConfig,
) -> Vec<PersistentVolumeClaim> {
    let owner = run.owner_reference();
    let mut claims = Vec::new();

    if needs_artifacts {
        let mut meta = ObjectMeta::new(
            run.metadata.namespace.clone(),
            artifact_claim_name(&run.metadata.name),
        );
        meta.owner_references.push(owner.clone());
        claims.push(PersistentVolumeClaim {
            metadata: meta,
            spec: PersistentVolumeClaimSpec {
                access_modes: vec!["ReadWriteOnce".to_string()],
                storage: config.storage_size.clone(),
                storage_class: config.storage_class.clone(),
            },
        });
    }

    for binding in &run.spec.workspaces {
        let WorkspaceSource::VolumeClaimTemplate(template) = &binding.source else {
            continue;
        };
        let used = nodes
            .clone()
            .any(|n| n.workspaces.iter().any(|w| w.workspace == binding.name));
        if !used {
            continue;
        }

        let mut meta = template.metadata.clone();
        meta.name = template_claim_name(template, &binding.name, &run.metadata.name);
        meta.namespace = run.metadata.namespace.clone();
        meta.resource_version = 0;
        meta.owner_references = vec![owner.clone()];
        claims.push(PersistentVolumeClaim {
            metadata: meta,
            spec: template.spec.clone(),
        });
    }
    claims
}

/// Create each claim unless it already exists.
pub async fn ensure_claims(store: &dyn Store, claims: &[PersistentVolumeClaim]) -> StoreResult<()> {
    for claim in claims {
        let ns = claim.metadata.namespace.as_str();
        let name = claim.metadata.name.as_str();
        match store.get_pvc(ns, name).await {
            Ok(_) => debug!(claim = %name, "claim already present"),
            Err(e) if e.is_not_found() => match store.create_pvc(claim).await {
                Ok(_) => info!(claim = %name, "created claim"),
                Err(e) if e.is_already_exists() => {
                    debug!(claim = %name, "claim created concurrently")
                }
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        PipelineRunSpec, PipelineSource, TaskReference, WorkspacePipelineTaskBinding,
    };
    use crate::config::ReconcilerConfig;

    fn run_with(workspaces: Vec<WorkspaceBinding>) -> PipelineRun {
        PipelineRun {
            metadata: ObjectMeta::new("ns", "run"),
            spec: PipelineRunSpec {
                pipeline: PipelineSource::Ref {
                    name: "p".to_string(),
                },
                params: vec![],
                resources: vec![],
                workspaces,
                service_account_name: None,
                service_account_names: vec![],
                timeout: None,
                status: None,
            },
            status: Default::default(),
        }
    }

    fn node_binding(ws: &str, sub_path: &str) -> PipelineTask {
        let mut t = PipelineTask::new("a", TaskReference::named("t"));
        t.workspaces.push(WorkspacePipelineTaskBinding {
            name: "src".to_string(),
            workspace: ws.to_string(),
            sub_path: sub_path.to_string(),
        });
        t
    }

    #[test]
    fn sub_path_join_skips_empty_segments() {
        assert_eq!(join_sub_paths("", ""), "");
        assert_eq!(join_sub_paths("run", ""), "run");
        assert_eq!(join_sub_paths("", "node"), "node");
        assert_eq!(join_sub_paths("run", "node"), "run/node");
    }

    #[test]
    fn template_workspace_becomes_claim() {
        let run = run_with(vec![WorkspaceBinding {
            name: "shared".to_string(),
            sub_path: "base".to_string(),
            source: WorkspaceSource::VolumeClaimTemplate(VolumeClaimTemplate::default()),
        }]);
        let node = node_binding("shared", "leaf");

        let bound = node_workspaces(&run, &node);
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].name, "src");
        assert_eq!(bound[0].sub_path, "base/leaf");
        assert_eq!(
            bound[0].source,
            WorkspaceSource::PersistentVolumeClaim {
                claim_name: "pvc-shared-run".to_string()
            }
        );

        let claims = required_claims(&run, [&node].into_iter(), false, &ReconcilerConfig::default().artifacts);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].metadata.name, "pvc-shared-run");
        assert!(claims[0].metadata.is_controlled_by(&run.owner_reference()));
    }

    #[test]
    fn unused_template_is_not_provisioned() {
        let run = run_with(vec![WorkspaceBinding {
            name: "unused".to_string(),
            sub_path: String::new(),
            source: WorkspaceSource::VolumeClaimTemplate(VolumeClaimTemplate::default()),
        }]);
        let node = node_binding("other", "");
        let claims = required_claims(&run, [&node].into_iter(), false, &ReconcilerConfig::default().artifacts);
        assert!(claims.is_empty());
    }

    #[test]
    fn artifact_claim_and_paths() {
        let run = run_with(vec![]);
        let claims = required_claims(&run, std::iter::empty(), true, &ReconcilerConfig::default().artifacts);
        assert_eq!(claims[0].metadata.name, "run-pvc");

        assert_eq!(
            input_paths("/pvc", &["a".to_string(), "b".to_string()], "src"),
            vec!["/pvc/a/src".to_string(), "/pvc/b/src".to_string()]
        );
        assert_eq!(output_path("/pvc/", "a", "out"), "/pvc/a/out");
    }
}
