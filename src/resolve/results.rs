// src/resolve/results.rs

//! `$(tasks.<node>.results.<name>)` references.

use std::sync::LazyLock;

use regex::Regex;

use crate::api::{Param, PipelineResult, PipelineRunResult, PipelineTask};

static RESULT_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\(tasks\.([^.()\s]+)\.results\.([^()\s]+)\)").expect("result reference regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResultRef {
    pub task: String,
    pub result: String,
}

impl std::fmt::Display for ResultRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "$(tasks.{}.results.{})", self.task, self.result)
    }
}

/// Every result reference in `s`, in order of appearance.
pub fn result_refs(s: &str) -> Vec<ResultRef> {
    RESULT_REF
        .captures_iter(s)
        .map(|c| ResultRef {
            task: c[1].to_string(),
            result: c[2].to_string(),
        })
        .collect()
}

pub fn param_result_refs(params: &[Param]) -> Vec<ResultRef> {
    params
        .iter()
        .flat_map(|p| p.value.strings().into_iter().flat_map(result_refs).collect::<Vec<_>>())
        .collect()
}

/// Result references of a node's own params and its condition params.
pub fn node_result_refs(task: &PipelineTask) -> Vec<ResultRef> {
    let mut refs = param_result_refs(&task.params);
    for cond in &task.conditions {
        refs.extend(param_result_refs(&cond.params));
    }
    refs
}

/// Replace every result reference in `s` using `lookup`.
///
/// Returns the first reference `lookup` could not satisfy.
pub fn replace_results(
    s: &str,
    lookup: &impl Fn(&ResultRef) -> Option<String>,
) -> Result<String, ResultRef> {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in RESULT_REF.captures_iter(s) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let r = ResultRef {
            task: caps[1].to_string(),
            result: caps[2].to_string(),
        };
        let value = lookup(&r).ok_or(r)?;
        out.push_str(&s[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

/// Substitute result references in parameter values.
pub fn apply_task_results(
    params: &[Param],
    lookup: &impl Fn(&ResultRef) -> Option<String>,
) -> Result<Vec<Param>, ResultRef> {
    params
        .iter()
        .map(|p| {
            let mut failed = None;
            let value = p.value.map_strings(|s| match replace_results(s, lookup) {
                Ok(v) => v,
                Err(r) => {
                    failed.get_or_insert(r);
                    s.to_string()
                }
            });
            match failed {
                Some(r) => Err(r),
                None => Ok(Param {
                    name: p.name.clone(),
                    value,
                }),
            }
        })
        .collect()
}

/// Evaluate declared pipeline results; unsatisfiable ones are omitted.
pub fn pipeline_results(
    declared: &[PipelineResult],
    lookup: &impl Fn(&ResultRef) -> Option<String>,
) -> Vec<PipelineRunResult> {
    declared
        .iter()
        .filter_map(|r| {
            replace_results(&r.value, lookup)
                .ok()
                .map(|value| PipelineRunResult {
                    name: r.name.clone(),
                    value,
                })
        })
        .collect()
}
