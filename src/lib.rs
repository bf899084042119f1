// src/lib.rs

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod controller;
pub mod dag;
pub mod errors;
pub mod logging;
pub mod reconciler;
pub mod resolve;
pub mod store;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{PipelineRun, PipelineRunStatus, PipelineSource};
use crate::cli::CliArgs;
use crate::config::load_or_default;
use crate::controller::{Controller, ControllerOptions};
use crate::dag::DagGraph;
use crate::reconciler::Reconciler;
use crate::store::{MemoryStore, Objects};

/// High-level entry point used by `main.rs`.
///
/// Loads config and object state, then either prints each run's graph
/// (`--dry-run`) or runs the controller and prints the resulting statuses.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)
        .with_context(|| format!("loading config {}", args.config))?;
    let objects = load_state(&args.state)
        .with_context(|| format!("loading state {}", args.state))?;

    if args.dry_run {
        print_dry_run(&objects);
        return Ok(());
    }

    let store = MemoryStore::from_objects(objects);
    info!(
        runs = store.objects().pipeline_runs.len(),
        workers = cfg.controller.workers,
        "store seeded"
    );

    let reconciler = Arc::new(Reconciler::new(Arc::new(store.clone()), cfg));
    let options = ControllerOptions {
        exit_when_idle: args.once,
    };
    Controller::new(reconciler, options).run().await?;

    print_statuses(&store.objects().pipeline_runs)?;
    Ok(())
}

/// Parse a state file: TOML when the extension says so, JSON otherwise.
pub fn load_state(path: impl AsRef<Path>) -> errors::Result<Objects> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    let objects = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&contents)?,
        _ => serde_json::from_str(&contents)?,
    };
    Ok(objects)
}

#[derive(Serialize)]
struct RunReport<'a> {
    namespace: &'a str,
    name: &'a str,
    status: &'a PipelineRunStatus,
}

fn print_statuses(runs: &[PipelineRun]) -> Result<()> {
    let reports: Vec<RunReport<'_>> = runs
        .iter()
        .map(|r| RunReport {
            namespace: &r.metadata.namespace,
            name: &r.metadata.name,
            status: &r.status,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

/// Print each run's pipeline in topological order with its dependencies.
fn print_dry_run(objects: &Objects) {
    println!("rundag dry-run");
    println!("  pipelines: {}", objects.pipelines.len());
    println!("  runs: {}", objects.pipeline_runs.len());
    println!();

    for run in &objects.pipeline_runs {
        println!("run {}:", run.metadata.key());
        let spec = match &run.spec.pipeline {
            PipelineSource::Inline(spec) => Some(spec),
            PipelineSource::Ref { name } => objects
                .pipelines
                .iter()
                .find(|p| p.metadata.name == *name && p.metadata.namespace == run.metadata.namespace)
                .map(|p| &p.spec),
        };
        let Some(spec) = spec else {
            warn!(run = %run.metadata.key(), "pipeline not found in state");
            println!("  (pipeline not found)");
            continue;
        };

        match DagGraph::build(spec) {
            Ok(graph) => {
                for name in graph.topological_order() {
                    let deps = graph.dependencies_of(&name);
                    if deps.is_empty() {
                        println!("  - {name}");
                    } else {
                        println!("  - {name} (after: {})", deps.join(", "));
                    }
                }
            }
            Err(e) => println!("  invalid graph: {e}"),
        }
    }

    debug!("dry-run complete (nothing reconciled)");
}
