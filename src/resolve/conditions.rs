// src/resolve/conditions.rs

use std::collections::BTreeMap;

use crate::api::{Condition, Param, PipelineTask};
use crate::resolve::resources::{ResolvedResource, ResolvedResourceBinding, bind_input};
use crate::resolve::{ResolveError, lookup};
use crate::store::Store;

/// One condition reference of a node, with its gate object fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCondition {
    /// `<condition>-<ordinal>`; keys the check within the node.
    pub register_name: String,
    pub condition: Condition,
    pub params: Vec<Param>,
    pub resources: Vec<ResolvedResourceBinding>,
}

pub fn register_name(condition_ref: &str, ordinal: usize) -> String {
    format!("{condition_ref}-{ordinal}")
}

pub async fn resolve_conditions(
    store: &dyn Store,
    namespace: &str,
    node: &PipelineTask,
    resolved_resources: &BTreeMap<String, ResolvedResource>,
) -> Result<Vec<ResolvedCondition>, ResolveError> {
    let mut out = Vec::with_capacity(node.conditions.len());
    for (ordinal, cond) in node.conditions.iter().enumerate() {
        let condition = lookup(
            store.get_condition(namespace, &cond.condition_ref).await,
            |_| ResolveError::ConditionNotFound {
                pipeline_task: node.name.clone(),
                name: cond.condition_ref.clone(),
            },
        )?;

        let resources = cond
            .resources
            .iter()
            .map(|input| bind_input(&node.name, input, resolved_resources))
            .collect::<Result<Vec<_>, _>>()?;

        for decl in &condition.spec.params {
            if decl.default.is_none() && !cond.params.iter().any(|p| p.name == decl.name) {
                return Err(ResolveError::FailedValidation(format!(
                    "condition '{}' of pipeline task '{}' requires param '{}'",
                    cond.condition_ref, node.name, decl.name
                )));
            }
        }

        out.push(ResolvedCondition {
            register_name: register_name(&cond.condition_ref, ordinal),
            condition,
            params: cond.params.clone(),
            resources,
        });
    }
    Ok(out)
}
