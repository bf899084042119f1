// src/resolve/task.rs

use crate::api::{PipelineTask, ResourceType, TaskKind, TaskReference, TaskRunTaskSource, TaskSpec};
use crate::resolve::resources::ResolvedResourceBinding;
use crate::resolve::{ResolveError, lookup};
use crate::store::Store;

/// A node's task after reference resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTask {
    /// How the generated task-run refers to it.
    pub source: TaskRunTaskSource,
    pub spec: TaskSpec,
}

pub async fn resolve_task(
    store: &dyn Store,
    namespace: &str,
    node: &PipelineTask,
) -> Result<ResolvedTask, ResolveError> {
    match &node.task {
        TaskReference::Named { name } => {
            let task = lookup(store.get_task(namespace, name).await, |_| {
                ResolveError::TaskNotFound {
                    pipeline_task: node.name.clone(),
                    kind: TaskKind::Task,
                    name: name.clone(),
                }
            })?;
            Ok(ResolvedTask {
                source: TaskRunTaskSource::Ref {
                    name: name.clone(),
                    kind: TaskKind::Task,
                },
                spec: task.spec,
            })
        }
        TaskReference::Cluster { name } => {
            let task = lookup(store.get_cluster_task(name).await, |_| {
                ResolveError::TaskNotFound {
                    pipeline_task: node.name.clone(),
                    kind: TaskKind::ClusterTask,
                    name: name.clone(),
                }
            })?;
            Ok(ResolvedTask {
                source: TaskRunTaskSource::Ref {
                    name: name.clone(),
                    kind: TaskKind::ClusterTask,
                },
                spec: task.spec,
            })
        }
        TaskReference::Inline(spec) => Ok(ResolvedTask {
            source: TaskRunTaskSource::Inline(spec.clone()),
            spec: spec.clone(),
        }),
    }
}

/// Check a node's params, resources and workspaces against its task.
pub fn validate_node_against_task(
    node: &PipelineTask,
    task: &TaskSpec,
    inputs: &[ResolvedResourceBinding],
    outputs: &[ResolvedResourceBinding],
) -> Result<(), ResolveError> {
    for decl in &task.params {
        match node.params.iter().find(|p| p.name == decl.name) {
            None if decl.default.is_none() => {
                return Err(ResolveError::FailedValidation(format!(
                    "pipeline task '{}' doesn't provide param '{}' required by its task",
                    node.name, decl.name
                )));
            }
            Some(p) if p.value.param_type() != decl.type_ => {
                return Err(ResolveError::ParameterTypeMismatch(format!(
                    "pipeline task '{}' passes param '{}' as {:?} but the task expects {:?}",
                    node.name,
                    decl.name,
                    p.value.param_type(),
                    decl.type_
                )));
            }
            _ => {}
        }
    }

    check_resources(&node.name, "input", &task.resources.inputs, inputs)?;
    check_resources(&node.name, "output", &task.resources.outputs, outputs)?;

    for decl in task.workspaces.iter().filter(|w| !w.optional) {
        if !node.workspaces.iter().any(|w| w.name == decl.name) {
            return Err(ResolveError::FailedValidation(format!(
                "pipeline task '{}' doesn't bind workspace '{}' required by its task",
                node.name, decl.name
            )));
        }
    }
    Ok(())
}

fn check_resources(
    node: &str,
    direction: &str,
    declared: &[crate::api::TaskResource],
    bound: &[ResolvedResourceBinding],
) -> Result<(), ResolveError> {
    for b in bound {
        let Some(decl) = declared.iter().find(|d| d.name == b.name) else {
            return Err(ResolveError::InvalidBindings(format!(
                "pipeline task '{node}' binds {direction} resource '{}' which its task doesn't declare",
                b.name
            )));
        };
        if decl.type_ != b.resource.type_ {
            return Err(ResolveError::InvalidBindings(type_mismatch(
                node,
                direction,
                &b.name,
                decl.type_,
                b.resource.type_,
            )));
        }
    }
    for decl in declared.iter().filter(|d| !d.optional) {
        if !bound.iter().any(|b| b.name == decl.name) {
            return Err(ResolveError::InvalidBindings(format!(
                "pipeline task '{node}' doesn't bind {direction} resource '{}' required by its task",
                decl.name
            )));
        }
    }
    Ok(())
}

fn type_mismatch(
    node: &str,
    direction: &str,
    name: &str,
    expected: ResourceType,
    actual: ResourceType,
) -> String {
    format!(
        "pipeline task '{node}' {direction} resource '{name}' expects type {expected} but is bound to {actual}"
    )
}
