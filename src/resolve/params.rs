// src/resolve/params.rs

//! `$(params.X)` and `$(context.*)` substitution.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::api::{ArrayOrString, Param, PipelineRun, PipelineSpec};

static PARAM_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\(params\.([A-Za-z0-9_-]+)(\[\*\])?\)").expect("param reference regex is valid")
});

/// Names of every pipeline parameter referenced in `s`.
pub fn param_refs(s: &str) -> Vec<String> {
    PARAM_REF
        .captures_iter(s)
        .map(|c| c[1].to_string())
        .collect()
}

/// Values available for substitution within one run.
#[derive(Debug, Clone, Default)]
pub struct ParamContext {
    strings: BTreeMap<String, String>,
    arrays: BTreeMap<String, Vec<String>>,
}

impl ParamContext {
    /// Pipeline defaults overlaid with run values, plus context variables.
    pub fn for_run(spec: &PipelineSpec, run: &PipelineRun, pipeline_name: &str) -> Self {
        let mut ctx = ParamContext::default();

        for decl in &spec.params {
            if let Some(default) = &decl.default {
                ctx.insert_param(&decl.name, default);
            }
        }
        for p in &run.spec.params {
            ctx.insert_param(&p.name, &p.value);
        }

        ctx.strings.insert(
            "context.pipelineRun.name".to_string(),
            run.metadata.name.clone(),
        );
        ctx.strings.insert(
            "context.pipelineRun.namespace".to_string(),
            run.metadata.namespace.clone(),
        );
        ctx.strings
            .insert("context.pipeline.name".to_string(), pipeline_name.to_string());
        ctx
    }

    fn insert_param(&mut self, name: &str, value: &ArrayOrString) {
        let key = format!("params.{name}");
        match value {
            ArrayOrString::String(s) => {
                self.arrays.remove(&key);
                self.strings.insert(key, s.clone());
            }
            ArrayOrString::Array(items) => {
                self.strings.remove(&key);
                self.arrays.insert(key, items.clone());
            }
        }
    }

    /// Replace string-valued references inside `s`.
    ///
    /// Array parameters embedded in a larger string are left untouched.
    pub fn replace_str(&self, s: &str) -> String {
        if !s.contains("$(") {
            return s.to_string();
        }
        let mut out = s.to_string();
        for (key, value) in &self.strings {
            let token = format!("$({key})");
            if out.contains(&token) {
                out = out.replace(&token, value);
            }
        }
        out
    }

    /// The array a whole-string reference such as `$(params.list[*])` names.
    fn whole_array(&self, s: &str) -> Option<&Vec<String>> {
        let caps = PARAM_REF.captures(s)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != s.len() {
            return None;
        }
        self.arrays.get(&format!("params.{}", &caps[1]))
    }

    pub fn replace_value(&self, value: &ArrayOrString) -> ArrayOrString {
        match value {
            ArrayOrString::String(s) => match self.whole_array(s) {
                Some(items) => ArrayOrString::Array(items.clone()),
                None => ArrayOrString::String(self.replace_str(s)),
            },
            ArrayOrString::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.whole_array(item) {
                        Some(expanded) => out.extend(expanded.iter().cloned()),
                        None => out.push(self.replace_str(item)),
                    }
                }
                ArrayOrString::Array(out)
            }
        }
    }

    pub fn replace_params(&self, params: &[Param]) -> Vec<Param> {
        params
            .iter()
            .map(|p| Param {
                name: p.name.clone(),
                value: self.replace_value(&p.value),
            })
            .collect()
    }
}

/// Apply run parameters to every node and condition of a spec.
pub fn apply_parameters(spec: &PipelineSpec, ctx: &ParamContext) -> PipelineSpec {
    let mut out = spec.clone();
    for task in &mut out.tasks {
        task.params = ctx.replace_params(&task.params);
        for cond in &mut task.conditions {
            cond.params = ctx.replace_params(&cond.params);
        }
        for ws in &mut task.workspaces {
            ws.sub_path = ctx.replace_str(&ws.sub_path);
        }
    }
    for result in &mut out.results {
        result.value = ctx.replace_str(&result.value);
    }
    out
}
