// src/resolve/plan.rs

use std::collections::BTreeMap;

use tracing::debug;

use crate::api::{PipelineRun, PipelineSpec, PipelineTask};
use crate::resolve::ResolveError;
use crate::resolve::conditions::{ResolvedCondition, resolve_conditions};
use crate::resolve::resources::{
    ResolvedResourceBinding, bind_input, bind_output, resolve_run_resources,
};
use crate::resolve::task::{ResolvedTask, resolve_task, validate_node_against_task};
use crate::store::Store;

/// Definition-derived execution plan for one node.
///
/// Status-derived parts (generated names, existing children) are attached
/// by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePlan {
    /// The node with run parameters already substituted.
    pub task: PipelineTask,
    pub resolved_task: ResolvedTask,
    pub inputs: Vec<ResolvedResourceBinding>,
    pub outputs: Vec<ResolvedResourceBinding>,
    pub conditions: Vec<ResolvedCondition>,
}

/// Resolve every node of a parameter-substituted spec.
pub async fn resolve_pipeline_plans(
    store: &dyn Store,
    run: &PipelineRun,
    spec: &PipelineSpec,
) -> Result<BTreeMap<String, NodePlan>, ResolveError> {
    let namespace = run.metadata.namespace.as_str();
    let resources = resolve_run_resources(store, run, spec).await?;

    let mut plans = BTreeMap::new();
    for node in &spec.tasks {
        let resolved_task = resolve_task(store, namespace, node).await?;

        let inputs = node
            .resources
            .inputs
            .iter()
            .map(|i| bind_input(&node.name, i, &resources))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = node
            .resources
            .outputs
            .iter()
            .map(|o| bind_output(&node.name, &o.name, &o.resource, &resources))
            .collect::<Result<Vec<_>, _>>()?;

        validate_node_against_task(node, &resolved_task.spec, &inputs, &outputs)?;

        let conditions = resolve_conditions(store, namespace, node, &resources).await?;
        debug!(
            task = %node.name,
            conditions = conditions.len(),
            inputs = inputs.len(),
            outputs = outputs.len(),
            "resolved node plan"
        );

        plans.insert(
            node.name.clone(),
            NodePlan {
                task: node.clone(),
                resolved_task,
                inputs,
                outputs,
                conditions,
            },
        );
    }
    Ok(plans)
}
