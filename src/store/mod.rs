// src/store/mod.rs

//! Control-plane store seam.
//!
//! The reconciler only ever talks to the cluster through [`Store`]: typed
//! get/list/create, a status update guarded by the last-read resource
//! version, and a cancellation patch for task-runs. `memory` provides an
//! in-process implementation used by the binary and the tests.

pub mod memory;

use tokio::sync::broadcast;

use crate::api::{
    ClusterTask, Condition, PersistentVolumeClaim, Pipeline, PipelineResource, PipelineRun,
    Task, TaskRun,
};
use crate::types::LabelSelector;

pub use memory::{Action, MemoryStore, Objects, Verb};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: String },

    #[error("conflict updating {kind} {key}: expected version {expected}, found {actual}")]
    Conflict {
        kind: &'static str,
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A change notification emitted after every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
    /// Name of the PipelineRun that controls the object (itself for runs).
    pub run: Option<String>,
}

impl WatchEvent {
    /// Work key of the affected run, if any.
    pub fn run_key(&self) -> Option<String> {
        self.run
            .as_ref()
            .map(|run| format!("{}/{}", self.namespace, run))
    }
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn get_pipeline_run(&self, namespace: &str, name: &str) -> StoreResult<PipelineRun>;

    async fn list_pipeline_runs(&self) -> StoreResult<Vec<PipelineRun>>;

    /// Write labels, annotations and status of a run.
    ///
    /// Fails with [`StoreError::Conflict`] unless `run.metadata.resource_version`
    /// matches the stored version.
    async fn update_pipeline_run(&self, run: &PipelineRun) -> StoreResult<PipelineRun>;

    async fn get_pipeline(&self, namespace: &str, name: &str) -> StoreResult<Pipeline>;

    async fn get_task(&self, namespace: &str, name: &str) -> StoreResult<Task>;

    async fn get_cluster_task(&self, name: &str) -> StoreResult<ClusterTask>;

    async fn get_condition(&self, namespace: &str, name: &str) -> StoreResult<Condition>;

    async fn get_pipeline_resource(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<PipelineResource>;

    async fn get_task_run(&self, namespace: &str, name: &str) -> StoreResult<TaskRun>;

    async fn list_task_runs(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<TaskRun>>;

    async fn create_task_run(&self, task_run: &TaskRun) -> StoreResult<TaskRun>;

    /// Version-checked status write, used to reset a task-run for a retry.
    async fn update_task_run_status(&self, task_run: &TaskRun) -> StoreResult<TaskRun>;

    /// Patch `spec.status = Cancelled` onto a task-run.
    async fn cancel_task_run(&self, namespace: &str, name: &str) -> StoreResult<TaskRun>;

    async fn get_pvc(&self, namespace: &str, name: &str) -> StoreResult<PersistentVolumeClaim>;

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> StoreResult<PersistentVolumeClaim>;

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}
