// src/reconciler/mod.rs

//! The pipeline-run reconciler.
//!
//! [`Reconciler::reconcile`] performs one complete pass for a run key:
//!
//! 1. fetch the run and list its labelled children;
//! 2. merge orphaned children into the status map (`status`);
//! 3. handle explicit cancellation (`cancel`);
//! 4. resolve the pipeline, validate it and build the graph (`crate::dag`,
//!    `crate::resolve`);
//! 5. handle timeouts (`timeout`, `cancel`);
//! 6. provision claims and create or retry children (`workspace`, `scheduler`);
//! 7. aggregate status and persist the run at most once.
//!
//! Each pass re-derives everything from the store, so it can be repeated
//! any number of times without creating a child twice.

pub mod cancel;
pub mod child;
pub mod names;
pub mod scheduler;
pub mod state;
pub mod status;
pub mod timeout;
pub mod workspace;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::api::{
    ConditionStatus, PipelineRun, PipelineSource, PipelineSpec, Reason, TaskRun, labels, split_key,
};
use crate::clock::{Clock, SystemClock};
use crate::config::ReconcilerConfig;
use crate::dag::DagGraph;
use crate::resolve::validate::{
    validate_param_types, validate_pipeline_spec, validate_required_params,
    validate_resource_bindings, validate_workspace_bindings,
};
use crate::resolve::{ParamContext, ResolveError, apply_parameters, lookup, resolve_pipeline_plans};
use crate::store::{Store, StoreError};
use crate::types::LabelSelector;

pub use names::{NameGenerator, RandomNameGenerator, SequentialNameGenerator};
pub use state::{ResolvedConditionCheck, ResolvedNode};

use child::ChildContext;
use scheduler::Scheduler;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not cancel {} task-run(s) of {run}: {}", .failures.len(), .failures.join("; "))]
    CouldntCancel { run: String, failures: Vec<String> },
}

pub struct Reconciler {
    store: Arc<dyn Store>,
    config: Arc<ReconcilerConfig>,
    clock: Arc<dyn Clock>,
    names: Arc<dyn NameGenerator>,
}

/// Validated graph plus the parameter-substituted spec it was built from.
struct Prepared {
    graph: DagGraph,
    spec: PipelineSpec,
    nodes: Vec<ResolvedNode>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, config: ReconcilerConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
            names: Arc::new(RandomNameGenerator),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_name_generator(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Reconcile the run identified by `namespace/name`.
    ///
    /// Malformed keys and deleted runs are a no-op. An error means the pass
    /// should be retried.
    pub async fn reconcile(&self, key: &str) -> Result<(), ReconcileError> {
        let Some((namespace, name)) = split_key(key) else {
            warn!(key = %key, "dropping malformed run key");
            return Ok(());
        };

        let original = match self.store.get_pipeline_run(namespace, name).await {
            Ok(run) => run,
            Err(e) if e.is_not_found() => {
                debug!(run = %key, "pipeline run no longer exists");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut run = original.clone();
        let outcome = self.reconcile_run(&mut run).await;

        if run.metadata.labels != original.metadata.labels
            || run.metadata.annotations != original.metadata.annotations
            || run.status != original.status
        {
            if let Err(e) = self.store.update_pipeline_run(&run).await {
                warn!(run = %key, error = %e, "failed to persist pipeline run status");
                return Err(e.into());
            }
            debug!(run = %key, "persisted pipeline run status");
        }

        if let Err(e) = &outcome {
            error!(run = %key, error = %e, "reconcile pass failed");
        }
        outcome
    }

    async fn reconcile_run(&self, run: &mut PipelineRun) -> Result<(), ReconcileError> {
        let now = self.clock.now();
        let children = self.children(run).await?;

        if run.is_done() {
            status::refresh_known_children(run, &children);
            return Ok(());
        }

        if run.status.start_time.is_none() {
            run.status.start_time = Some(now);
        }
        if run.succeeded().is_none() {
            status::set_run_condition(run, ConditionStatus::Unknown, Reason::Started, "", now);
        }

        let recovered = status::recover_orphans(run, &children, self.names.as_ref());
        if recovered > 0 {
            info!(run = %run.metadata.key(), recovered, "merged orphaned children into status");
        }

        if run.is_cancelled() {
            return cancel::cancel_run(self.store.as_ref(), run, &children, now).await;
        }

        let pipeline_name = match self.resolve_pipeline(run).await {
            Ok(name) => name,
            Err(e) => return self.fail_run(run, e, now),
        };

        let children = self.with_recorded_children(run, children).await?;
        let Prepared {
            graph,
            spec,
            mut nodes,
        } = match self.prepare(run, &pipeline_name, &children).await {
            Ok(prepared) => prepared,
            Err(e) => return self.fail_run(run, e, now),
        };

        if timeout::is_timed_out(run, &self.config, now) {
            let limit = timeout::run_timeout(run, &self.config);
            return cancel::time_out_run(self.store.as_ref(), run, &nodes, limit, now).await;
        }

        let snapshot = run.clone();
        let scheduler = Scheduler {
            store: self.store.as_ref(),
            ctx: ChildContext {
                run: &snapshot,
                pipeline_name: &pipeline_name,
                config: &self.config,
                now,
                artifacts_in_use: workspace::uses_artifact_storage(nodes.iter().map(|n| &n.plan)),
            },
        };
        let scheduled = scheduler.run_next(&graph, &mut nodes).await;

        status::record_nodes(run, &nodes, now);
        match scheduled {
            Ok(()) => {
                status::aggregate(run, &graph, &nodes, &spec, now);
                Ok(())
            }
            Err(ResolveError::Store(e)) => {
                status::aggregate(run, &graph, &nodes, &spec, now);
                Err(e.into())
            }
            Err(e) => self.fail_run(run, e, now),
        }
    }

    /// Ensure the pipeline spec snapshot is stored on the run; returns the
    /// pipeline name.
    async fn resolve_pipeline(&self, run: &mut PipelineRun) -> Result<String, ResolveError> {
        let (name, spec) = match &run.spec.pipeline {
            PipelineSource::Ref { name } => {
                let spec = match &run.status.pipeline_spec {
                    Some(stored) => stored.clone(),
                    None => {
                        lookup(
                            self.store.get_pipeline(&run.metadata.namespace, name).await,
                            |source| ResolveError::PipelineNotFound {
                                namespace: run.metadata.namespace.clone(),
                                name: name.clone(),
                                source,
                            },
                        )?
                        .spec
                    }
                };
                (name.clone(), spec)
            }
            PipelineSource::Inline(spec) => (
                run.metadata.name.clone(),
                run.status.pipeline_spec.clone().unwrap_or_else(|| spec.clone()),
            ),
        };

        run.metadata
            .labels
            .insert(labels::PIPELINE.to_string(), name.clone());
        run.status.pipeline_spec.get_or_insert(spec);
        Ok(name)
    }

    async fn prepare(
        &self,
        run: &PipelineRun,
        pipeline_name: &str,
        children: &BTreeMap<String, TaskRun>,
    ) -> Result<Prepared, ResolveError> {
        let Some(declared) = run.status.pipeline_spec.as_ref() else {
            return Err(ResolveError::FailedValidation(
                "pipeline spec was not resolved".to_string(),
            ));
        };

        validate_pipeline_spec(declared)?;
        let graph = DagGraph::build(declared)?;
        validate_resource_bindings(declared, run)?;
        validate_workspace_bindings(declared, run)?;
        validate_param_types(declared, run)?;
        validate_required_params(declared, run)?;

        let ctx = ParamContext::for_run(declared, run, pipeline_name);
        let spec = apply_parameters(declared, &ctx);
        let plans = resolve_pipeline_plans(self.store.as_ref(), run, &spec).await?;
        let nodes = state::resolve_nodes(run, &spec, plans, children, self.names.as_ref());

        Ok(Prepared { graph, spec, nodes })
    }

    fn fail_run(
        &self,
        run: &mut PipelineRun,
        err: ResolveError,
        now: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        if let ResolveError::Store(e) = err {
            return Err(e.into());
        }
        let reason = err.reason().unwrap_or(Reason::Failed);
        warn!(run = %run.metadata.key(), reason = %reason, error = %err, "pipeline run failed");
        status::set_run_condition(run, ConditionStatus::False, reason, err.to_string(), now);
        Ok(())
    }

    /// Children selected by the run label, keyed by name.
    async fn children(&self, run: &PipelineRun) -> Result<BTreeMap<String, TaskRun>, StoreError> {
        let selector = LabelSelector::new().with(labels::PIPELINE_RUN, run.metadata.name.clone());
        let listed = self
            .store
            .list_task_runs(&run.metadata.namespace, &selector)
            .await?;
        Ok(listed
            .into_iter()
            .map(|tr| (tr.metadata.name.clone(), tr))
            .collect())
    }

    /// Add children named in the status map whose labels no longer select them.
    async fn with_recorded_children(
        &self,
        run: &PipelineRun,
        mut children: BTreeMap<String, TaskRun>,
    ) -> Result<BTreeMap<String, TaskRun>, StoreError> {
        let names: Vec<String> = run
            .status
            .task_runs
            .iter()
            .flat_map(|(name, entry)| {
                std::iter::once(name.clone()).chain(entry.condition_checks.keys().cloned())
            })
            .filter(|name| !children.contains_key(name))
            .collect();

        for name in names {
            match self.store.get_task_run(&run.metadata.namespace, &name).await {
                Ok(tr) => {
                    children.insert(name, tr);
                }
                Err(e) if e.is_not_found() => {
                    debug!(task_run = %name, "recorded child not found in store")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(children)
    }
}
