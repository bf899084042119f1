// src/resolve/validate.rs

//! Admission-style validation of a pipeline spec against a run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::api::{PipelineRun, PipelineSpec};
use crate::resolve::ResolveError;
use crate::resolve::params::param_refs;
use crate::resolve::results::{node_result_refs, result_refs};

static DNS1123_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS-1123 regex is valid")
});

pub fn is_dns1123_label(name: &str) -> bool {
    name.len() <= 63 && DNS1123_LABEL.is_match(name)
}

fn invalid(msg: String) -> ResolveError {
    ResolveError::FailedValidation(msg)
}

/// Structural checks of the spec on its own.
pub fn validate_pipeline_spec(spec: &PipelineSpec) -> Result<(), ResolveError> {
    ensure_has_tasks(spec)?;
    validate_task_names(spec)?;
    validate_declared_params(spec)?;
    validate_references(spec)?;
    validate_resource_usage(spec)?;
    validate_workspace_usage(spec)?;
    Ok(())
}

fn ensure_has_tasks(spec: &PipelineSpec) -> Result<(), ResolveError> {
    if spec.tasks.is_empty() {
        return Err(invalid("pipeline must contain at least one task".to_string()));
    }
    Ok(())
}

fn validate_task_names(spec: &PipelineSpec) -> Result<(), ResolveError> {
    let mut seen = BTreeSet::new();
    for task in &spec.tasks {
        if !is_dns1123_label(&task.name) {
            return Err(invalid(format!(
                "pipeline task name '{}' must be a valid DNS-1123 label",
                task.name
            )));
        }
        if !seen.insert(task.name.as_str()) {
            return Err(invalid(format!(
                "pipeline task name '{}' is used more than once",
                task.name
            )));
        }
    }
    Ok(())
}

fn validate_declared_params(spec: &PipelineSpec) -> Result<(), ResolveError> {
    let mut seen = BTreeSet::new();
    for p in &spec.params {
        if !seen.insert(p.name.as_str()) {
            return Err(invalid(format!("parameter '{}' is declared more than once", p.name)));
        }
        if let Some(default) = &p.default {
            if default.param_type() != p.type_ {
                return Err(invalid(format!(
                    "parameter '{}' is declared {:?} but its default is {:?}",
                    p.name,
                    p.type_,
                    default.param_type()
                )));
            }
        }
    }

    for task in &spec.tasks {
        let mut strings: Vec<&str> = Vec::new();
        for p in &task.params {
            strings.extend(p.value.strings());
        }
        for cond in &task.conditions {
            for p in &cond.params {
                strings.extend(p.value.strings());
            }
        }
        for s in strings {
            for name in param_refs(s) {
                if !seen.contains(name.as_str()) {
                    return Err(invalid(format!(
                        "pipeline task '{}' references undeclared parameter '{}'",
                        task.name, name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_references(spec: &PipelineSpec) -> Result<(), ResolveError> {
    let names: BTreeSet<&str> = spec.tasks.iter().map(|t| t.name.as_str()).collect();

    for task in &spec.tasks {
        for dep in &task.run_after {
            if dep == &task.name {
                return Err(invalid(format!("pipeline task '{}' cannot run after itself", dep)));
            }
            if !names.contains(dep.as_str()) {
                return Err(invalid(format!(
                    "pipeline task '{}' runs after unknown task '{}'",
                    task.name, dep
                )));
            }
        }
        for r in node_result_refs(task) {
            if !names.contains(r.task.as_str()) {
                return Err(invalid(format!(
                    "pipeline task '{}' references result of unknown task '{}'",
                    task.name, r.task
                )));
            }
        }
    }

    for result in &spec.results {
        for r in result_refs(&result.value) {
            if !names.contains(r.task.as_str()) {
                return Err(invalid(format!(
                    "pipeline result '{}' references unknown task '{}'",
                    result.name, r.task
                )));
            }
        }
    }
    Ok(())
}

fn validate_resource_usage(spec: &PipelineSpec) -> Result<(), ResolveError> {
    let declared: BTreeSet<&str> = spec.resources.iter().map(|r| r.name.as_str()).collect();

    for task in &spec.tasks {
        let inputs = task
            .resources
            .inputs
            .iter()
            .chain(task.conditions.iter().flat_map(|c| c.resources.iter()));
        for input in inputs {
            if !declared.contains(input.resource.as_str()) {
                return Err(invalid(format!(
                    "pipeline task '{}' uses resource '{}' that is not declared by the pipeline",
                    task.name, input.resource
                )));
            }
            for from in &input.from {
                let Some(source) = spec.task(from) else {
                    return Err(invalid(format!(
                        "pipeline task '{}' takes '{}' from unknown task '{}'",
                        task.name, input.resource, from
                    )));
                };
                if !source
                    .resources
                    .outputs
                    .iter()
                    .any(|o| o.resource == input.resource)
                {
                    return Err(invalid(format!(
                        "pipeline task '{}' takes '{}' from task '{}' which does not output it",
                        task.name, input.resource, from
                    )));
                }
            }
        }
        for output in &task.resources.outputs {
            if !declared.contains(output.resource.as_str()) {
                return Err(invalid(format!(
                    "pipeline task '{}' outputs resource '{}' that is not declared by the pipeline",
                    task.name, output.resource
                )));
            }
        }
    }
    Ok(())
}

fn validate_workspace_usage(spec: &PipelineSpec) -> Result<(), ResolveError> {
    let declared: BTreeSet<&str> = spec.workspaces.iter().map(|w| w.name.as_str()).collect();
    for task in &spec.tasks {
        for ws in &task.workspaces {
            if !declared.contains(ws.workspace.as_str()) {
                return Err(invalid(format!(
                    "pipeline task '{}' uses workspace '{}' that is not declared by the pipeline",
                    task.name, ws.workspace
                )));
            }
        }
    }
    Ok(())
}

/// Every non-optional declared resource is bound, and nothing else is.
pub fn validate_resource_bindings(
    spec: &PipelineSpec,
    run: &PipelineRun,
) -> Result<(), ResolveError> {
    let mut bound: BTreeMap<&str, usize> = BTreeMap::new();
    for b in &run.spec.resources {
        *bound.entry(b.name.as_str()).or_default() += 1;
    }

    if let Some((name, _)) = bound.iter().find(|(_, n)| **n > 1) {
        return Err(ResolveError::InvalidBindings(format!(
            "resource '{name}' is bound more than once"
        )));
    }

    for decl in &spec.resources {
        if !decl.optional && !bound.contains_key(decl.name.as_str()) {
            return Err(ResolveError::InvalidBindings(format!(
                "pipeline declares resource '{}' but the run does not bind it",
                decl.name
            )));
        }
    }

    for name in bound.keys() {
        if !spec.resources.iter().any(|d| d.name == *name) {
            return Err(ResolveError::InvalidBindings(format!(
                "run binds resource '{name}' which the pipeline does not declare"
            )));
        }
    }
    Ok(())
}

pub fn validate_workspace_bindings(
    spec: &PipelineSpec,
    run: &PipelineRun,
) -> Result<(), ResolveError> {
    for decl in &spec.workspaces {
        if !run.spec.workspaces.iter().any(|w| w.name == decl.name) {
            return Err(ResolveError::InvalidWorkspaceBindings(format!(
                "pipeline expects workspace '{}' but the run does not bind it",
                decl.name
            )));
        }
    }
    Ok(())
}

/// Run-provided values have the declared type.
pub fn validate_param_types(spec: &PipelineSpec, run: &PipelineRun) -> Result<(), ResolveError> {
    let mut mismatched = Vec::new();
    for p in &run.spec.params {
        if let Some(decl) = spec.params.iter().find(|d| d.name == p.name) {
            if decl.type_ != p.value.param_type() {
                mismatched.push(p.name.as_str());
            }
        }
    }
    if !mismatched.is_empty() {
        return Err(ResolveError::ParameterTypeMismatch(format!(
            "parameters have inconsistent types: {}",
            mismatched.join(", ")
        )));
    }
    Ok(())
}

/// Params without a default must be provided by the run.
pub fn validate_required_params(
    spec: &PipelineSpec,
    run: &PipelineRun,
) -> Result<(), ResolveError> {
    let missing: Vec<&str> = spec
        .params
        .iter()
        .filter(|d| d.default.is_none())
        .filter(|d| !run.spec.params.iter().any(|p| p.name == d.name))
        .map(|d| d.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(invalid(format!(
            "pipeline parameters without default are not provided by the run: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}
