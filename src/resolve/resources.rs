// src/resolve/resources.rs

use std::collections::BTreeMap;

use crate::api::{PipelineRun, PipelineSpec, PipelineTaskInputResource, ResourceSource, ResourceType};
use crate::resolve::{ResolveError, lookup};
use crate::store::Store;

/// A run-level resource binding after lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub source: ResourceSource,
    pub type_: ResourceType,
}

/// One node-level binding: task resource name -> resolved pipeline resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResourceBinding {
    pub name: String,
    pub pipeline_resource: String,
    pub resource: ResolvedResource,
    pub from: Vec<String>,
}

/// Resolve every run binding, keyed by the pipeline-declared resource name.
pub async fn resolve_run_resources(
    store: &dyn Store,
    run: &PipelineRun,
    spec: &PipelineSpec,
) -> Result<BTreeMap<String, ResolvedResource>, ResolveError> {
    let mut out = BTreeMap::new();
    for binding in &run.spec.resources {
        let resolved = match &binding.resource {
            ResourceSource::Ref { name } => {
                let obj = lookup(
                    store
                        .get_pipeline_resource(&run.metadata.namespace, name)
                        .await,
                    |_| ResolveError::ResourceNotFound {
                        binding: binding.name.clone(),
                        name: name.clone(),
                    },
                )?;
                ResolvedResource {
                    source: binding.resource.clone(),
                    type_: obj.spec.type_,
                }
            }
            ResourceSource::Inline(inline) => ResolvedResource {
                source: binding.resource.clone(),
                type_: inline.type_,
            },
        };

        if let Some(decl) = spec.resources.iter().find(|d| d.name == binding.name) {
            if decl.type_ != resolved.type_ {
                return Err(ResolveError::InvalidBindings(format!(
                    "resource '{}' is declared as {} but bound to a {} resource",
                    binding.name, decl.type_, resolved.type_
                )));
            }
        }
        out.insert(binding.name.clone(), resolved);
    }
    Ok(out)
}

pub fn bind_input(
    node: &str,
    input: &PipelineTaskInputResource,
    resolved: &BTreeMap<String, ResolvedResource>,
) -> Result<ResolvedResourceBinding, ResolveError> {
    let resource = bound(node, &input.resource, resolved)?;
    Ok(ResolvedResourceBinding {
        name: input.name.clone(),
        pipeline_resource: input.resource.clone(),
        resource,
        from: input.from.clone(),
    })
}

pub fn bind_output(
    node: &str,
    name: &str,
    pipeline_resource: &str,
    resolved: &BTreeMap<String, ResolvedResource>,
) -> Result<ResolvedResourceBinding, ResolveError> {
    let resource = bound(node, pipeline_resource, resolved)?;
    Ok(ResolvedResourceBinding {
        name: name.to_string(),
        pipeline_resource: pipeline_resource.to_string(),
        resource,
        from: Vec::new(),
    })
}

fn bound(
    node: &str,
    pipeline_resource: &str,
    resolved: &BTreeMap<String, ResolvedResource>,
) -> Result<ResolvedResource, ResolveError> {
    resolved.get(pipeline_resource).cloned().ok_or_else(|| {
        ResolveError::InvalidBindings(format!(
            "pipeline task '{node}' uses resource '{pipeline_resource}' which the run does not bind"
        ))
    })
}
