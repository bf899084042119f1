// src/store/memory.rs

//! In-process [`Store`] backed by ordered maps.
//!
//! Besides serving the reconciler it records every mutation as an
//! [`Action`] and can be told to fail specific verbs, which is what the
//! integration tests assert against.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{Store, StoreError, StoreResult, WatchEvent};
use crate::api::{
    ClusterTask, Condition, Object, PersistentVolumeClaim, Pipeline, PipelineResource,
    PipelineRun, Task, TaskRun, TaskRunSpecStatus, TaskRunStatus, labels,
};
use crate::types::LabelSelector;

/// Seed/snapshot format of the store (also the CLI state file layout).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Objects {
    pub pipelines: Vec<Pipeline>,
    pub tasks: Vec<Task>,
    pub cluster_tasks: Vec<ClusterTask>,
    pub conditions: Vec<Condition>,
    pub pipeline_resources: Vec<PipelineResource>,
    pub pipeline_runs: Vec<PipelineRun>,
    pub task_runs: Vec<TaskRun>,
    pub persistent_volume_claims: Vec<PersistentVolumeClaim>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Create,
    Update,
    Patch,
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub verb: Verb,
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone)]
struct Reactor {
    verb: Verb,
    kind: &'static str,
    message: String,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_version: u64,
    pipelines: BTreeMap<String, Pipeline>,
    tasks: BTreeMap<String, Task>,
    cluster_tasks: BTreeMap<String, ClusterTask>,
    conditions: BTreeMap<String, Condition>,
    pipeline_resources: BTreeMap<String, PipelineResource>,
    pipeline_runs: BTreeMap<String, PipelineRun>,
    task_runs: BTreeMap<String, TaskRun>,
    pvcs: BTreeMap<String, PersistentVolumeClaim>,
    actions: Vec<Action>,
    reactors: Vec<Reactor>,
}

impl MemoryState {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    /// Apply failure injection for a mutation, consuming one-shot reactors.
    fn react(&mut self, verb: Verb, kind: &'static str) -> StoreResult<()> {
        let Some(idx) = self
            .reactors
            .iter()
            .position(|r| r.verb == verb && r.kind == kind)
        else {
            return Ok(());
        };
        let message = self.reactors[idx].message.clone();
        let exhausted = match self.reactors[idx].remaining.as_mut() {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            self.reactors.remove(idx);
        }
        Err(StoreError::Backend(message))
    }

    fn record(&mut self, verb: Verb, kind: &'static str, namespace: &str, name: &str) {
        self.actions.push(Action {
            verb,
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }
}

fn key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}

fn lookup<T: Object>(table: &BTreeMap<String, T>, key: String) -> StoreResult<T> {
    table
        .get(&key)
        .cloned()
        .ok_or(StoreError::NotFound { kind: T::KIND, key })
}

fn seed<T: Object>(table: &mut BTreeMap<String, T>, version: u64, mut obj: T) {
    if obj.metadata().resource_version == 0 {
        obj.metadata_mut().resource_version = version;
    }
    table.insert(obj.metadata().key(), obj);
}

/// Owning run of a stored object, for watch notifications.
fn owning_run<T: Object>(obj: &T) -> Option<String> {
    let meta = obj.metadata();
    meta.controller()
        .filter(|o| o.kind == PipelineRun::KIND)
        .map(|o| o.name.clone())
        .or_else(|| meta.label(labels::PIPELINE_RUN).map(str::to_string))
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(MemoryState::default())),
            events,
        }
    }

    pub fn from_objects(objects: Objects) -> Self {
        let store = Self::new();
        store.add_objects(objects);
        store
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }

    fn with_state(&self, f: impl FnOnce(&mut MemoryState)) {
        match self.inner.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn notify<T: Object>(&self, obj: &T) {
        let meta = obj.metadata();
        let run = if T::KIND == PipelineRun::KIND {
            Some(meta.name.clone())
        } else {
            owning_run(obj)
        };
        // No subscribers is fine.
        let _ = self.events.send(WatchEvent {
            kind: T::KIND,
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            run,
        });
    }

    pub fn add_objects(&self, objects: Objects) {
        self.with_state(|state| {
            for o in objects.pipelines {
                let v = state.bump();
                seed(&mut state.pipelines, v, o);
            }
            for o in objects.tasks {
                let v = state.bump();
                seed(&mut state.tasks, v, o);
            }
            for o in objects.cluster_tasks {
                let v = state.bump();
                seed(&mut state.cluster_tasks, v, o);
            }
            for o in objects.conditions {
                let v = state.bump();
                seed(&mut state.conditions, v, o);
            }
            for o in objects.pipeline_resources {
                let v = state.bump();
                seed(&mut state.pipeline_resources, v, o);
            }
            for o in objects.pipeline_runs {
                let v = state.bump();
                seed(&mut state.pipeline_runs, v, o);
            }
            for o in objects.task_runs {
                let v = state.bump();
                seed(&mut state.task_runs, v, o);
            }
            for o in objects.persistent_volume_claims {
                let v = state.bump();
                seed(&mut state.pvcs, v, o);
            }
        });
    }

    pub fn add_pipeline(&self, pipeline: Pipeline) {
        self.add_objects(Objects {
            pipelines: vec![pipeline],
            ..Default::default()
        });
    }

    pub fn add_task(&self, task: Task) {
        self.add_objects(Objects {
            tasks: vec![task],
            ..Default::default()
        });
    }

    pub fn add_cluster_task(&self, task: ClusterTask) {
        self.add_objects(Objects {
            cluster_tasks: vec![task],
            ..Default::default()
        });
    }

    pub fn add_condition(&self, condition: Condition) {
        self.add_objects(Objects {
            conditions: vec![condition],
            ..Default::default()
        });
    }

    pub fn add_pipeline_resource(&self, resource: PipelineResource) {
        self.add_objects(Objects {
            pipeline_resources: vec![resource],
            ..Default::default()
        });
    }

    pub fn add_pipeline_run(&self, run: PipelineRun) {
        self.add_objects(Objects {
            pipeline_runs: vec![run],
            ..Default::default()
        });
    }

    pub fn add_task_run(&self, task_run: TaskRun) {
        self.add_objects(Objects {
            task_runs: vec![task_run],
            ..Default::default()
        });
    }

    /// Everything currently stored.
    pub fn objects(&self) -> Objects {
        let mut out = Objects::default();
        self.with_state(|state| {
            out = Objects {
                pipelines: state.pipelines.values().cloned().collect(),
                tasks: state.tasks.values().cloned().collect(),
                cluster_tasks: state.cluster_tasks.values().cloned().collect(),
                conditions: state.conditions.values().cloned().collect(),
                pipeline_resources: state.pipeline_resources.values().cloned().collect(),
                pipeline_runs: state.pipeline_runs.values().cloned().collect(),
                task_runs: state.task_runs.values().cloned().collect(),
                persistent_volume_claims: state.pvcs.values().cloned().collect(),
            };
        });
        out
    }

    pub fn pipeline_run(&self, namespace: &str, name: &str) -> Option<PipelineRun> {
        let mut out = None;
        self.with_state(|state| out = state.pipeline_runs.get(&key(namespace, name)).cloned());
        out
    }

    pub fn task_run(&self, namespace: &str, name: &str) -> Option<TaskRun> {
        let mut out = None;
        self.with_state(|state| out = state.task_runs.get(&key(namespace, name)).cloned());
        out
    }

    pub fn task_runs(&self) -> Vec<TaskRun> {
        self.objects().task_runs
    }

    pub fn pvcs(&self) -> Vec<PersistentVolumeClaim> {
        self.objects().persistent_volume_claims
    }

    /// Stand-in for the task execution engine reporting progress.
    ///
    /// Replaces the status of a task-run, bumps its version and notifies
    /// watchers. Not recorded as an action.
    pub fn set_task_run_status(&self, namespace: &str, name: &str, status: TaskRunStatus) -> bool {
        let mut updated = None;
        self.with_state(|state| {
            let v = state.bump();
            if let Some(tr) = state.task_runs.get_mut(&key(namespace, name)) {
                tr.status = status;
                tr.metadata.resource_version = v;
                updated = Some(tr.clone());
            }
        });
        match updated {
            Some(tr) => {
                self.notify(&tr);
                true
            }
            None => false,
        }
    }

    /// Delete a task-run behind the reconciler's back.
    pub fn remove_task_run(&self, namespace: &str, name: &str) -> Option<TaskRun> {
        let mut removed = None;
        self.with_state(|state| removed = state.task_runs.remove(&key(namespace, name)));
        removed
    }

    pub fn actions(&self) -> Vec<Action> {
        let mut out = Vec::new();
        self.with_state(|state| out = state.actions.clone());
        out
    }

    /// Actions of one verb on one kind.
    pub fn actions_of(&self, verb: Verb, kind: &str) -> Vec<Action> {
        self.actions()
            .into_iter()
            .filter(|a| a.verb == verb && a.kind == kind)
            .collect()
    }

    pub fn clear_actions(&self) {
        self.with_state(|state| state.actions.clear());
    }

    /// Make every `verb` on `kind` fail with a backend error.
    pub fn fail_on(&self, verb: Verb, kind: &'static str, message: impl Into<String>) {
        let message = message.into();
        self.with_state(|state| {
            state.reactors.push(Reactor {
                verb,
                kind,
                message,
                remaining: None,
            })
        });
    }

    /// Make the next `verb` on `kind` fail once.
    pub fn fail_next(&self, verb: Verb, kind: &'static str, message: impl Into<String>) {
        let message = message.into();
        self.with_state(|state| {
            state.reactors.push(Reactor {
                verb,
                kind,
                message,
                remaining: Some(1),
            })
        });
    }

    pub fn clear_failures(&self) {
        self.with_state(|state| state.reactors.clear());
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_pipeline_run(&self, namespace: &str, name: &str) -> StoreResult<PipelineRun> {
        let state = self.lock()?;
        lookup(&state.pipeline_runs, key(namespace, name))
    }

    async fn list_pipeline_runs(&self) -> StoreResult<Vec<PipelineRun>> {
        let state = self.lock()?;
        Ok(state.pipeline_runs.values().cloned().collect())
    }

    async fn update_pipeline_run(&self, run: &PipelineRun) -> StoreResult<PipelineRun> {
        let updated = {
            let mut state = self.lock()?;
            state.react(Verb::Update, PipelineRun::KIND)?;
            let k = run.metadata.key();
            let v = state.bump();
            let stored = state
                .pipeline_runs
                .get_mut(&k)
                .ok_or_else(|| StoreError::NotFound {
                    kind: PipelineRun::KIND,
                    key: k.clone(),
                })?;
            if stored.metadata.resource_version != run.metadata.resource_version {
                return Err(StoreError::Conflict {
                    kind: PipelineRun::KIND,
                    key: k,
                    expected: run.metadata.resource_version,
                    actual: stored.metadata.resource_version,
                });
            }
            stored.metadata.labels = run.metadata.labels.clone();
            stored.metadata.annotations = run.metadata.annotations.clone();
            stored.status = run.status.clone();
            stored.metadata.resource_version = v;
            let updated = stored.clone();
            state.record(Verb::Update, PipelineRun::KIND, &run.metadata.namespace, &run.metadata.name);
            updated
        };
        self.notify(&updated);
        Ok(updated)
    }

    async fn get_pipeline(&self, namespace: &str, name: &str) -> StoreResult<Pipeline> {
        let state = self.lock()?;
        lookup(&state.pipelines, key(namespace, name))
    }

    async fn get_task(&self, namespace: &str, name: &str) -> StoreResult<Task> {
        let state = self.lock()?;
        lookup(&state.tasks, key(namespace, name))
    }

    async fn get_cluster_task(&self, name: &str) -> StoreResult<ClusterTask> {
        let state = self.lock()?;
        lookup(&state.cluster_tasks, name.to_string())
    }

    async fn get_condition(&self, namespace: &str, name: &str) -> StoreResult<Condition> {
        let state = self.lock()?;
        lookup(&state.conditions, key(namespace, name))
    }

    async fn get_pipeline_resource(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<PipelineResource> {
        let state = self.lock()?;
        lookup(&state.pipeline_resources, key(namespace, name))
    }

    async fn get_task_run(&self, namespace: &str, name: &str) -> StoreResult<TaskRun> {
        let state = self.lock()?;
        lookup(&state.task_runs, key(namespace, name))
    }

    async fn list_task_runs(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<TaskRun>> {
        let state = self.lock()?;
        Ok(state
            .task_runs
            .values()
            .filter(|tr| tr.metadata.namespace == namespace && selector.matches(&tr.metadata.labels))
            .cloned()
            .collect())
    }

    async fn create_task_run(&self, task_run: &TaskRun) -> StoreResult<TaskRun> {
        let created = {
            let mut state = self.lock()?;
            state.react(Verb::Create, TaskRun::KIND)?;
            let k = task_run.metadata.key();
            if state.task_runs.contains_key(&k) {
                return Err(StoreError::AlreadyExists {
                    kind: TaskRun::KIND,
                    key: k,
                });
            }
            let mut created = task_run.clone();
            created.metadata.resource_version = state.bump();
            state.task_runs.insert(k, created.clone());
            state.record(
                Verb::Create,
                TaskRun::KIND,
                &task_run.metadata.namespace,
                &task_run.metadata.name,
            );
            created
        };
        self.notify(&created);
        Ok(created)
    }

    async fn update_task_run_status(&self, task_run: &TaskRun) -> StoreResult<TaskRun> {
        let updated = {
            let mut state = self.lock()?;
            state.react(Verb::Update, TaskRun::KIND)?;
            let k = task_run.metadata.key();
            let v = state.bump();
            let stored = state
                .task_runs
                .get_mut(&k)
                .ok_or_else(|| StoreError::NotFound {
                    kind: TaskRun::KIND,
                    key: k.clone(),
                })?;
            if stored.metadata.resource_version != task_run.metadata.resource_version {
                return Err(StoreError::Conflict {
                    kind: TaskRun::KIND,
                    key: k,
                    expected: task_run.metadata.resource_version,
                    actual: stored.metadata.resource_version,
                });
            }
            stored.status = task_run.status.clone();
            stored.metadata.resource_version = v;
            let updated = stored.clone();
            state.record(
                Verb::Update,
                TaskRun::KIND,
                &task_run.metadata.namespace,
                &task_run.metadata.name,
            );
            updated
        };
        self.notify(&updated);
        Ok(updated)
    }

    async fn cancel_task_run(&self, namespace: &str, name: &str) -> StoreResult<TaskRun> {
        let patched = {
            let mut state = self.lock()?;
            state.react(Verb::Patch, TaskRun::KIND)?;
            let k = key(namespace, name);
            let v = state.bump();
            let stored = state
                .task_runs
                .get_mut(&k)
                .ok_or_else(|| StoreError::NotFound {
                    kind: TaskRun::KIND,
                    key: k.clone(),
                })?;
            stored.spec.status = Some(TaskRunSpecStatus::Cancelled);
            stored.metadata.resource_version = v;
            let patched = stored.clone();
            state.record(Verb::Patch, TaskRun::KIND, namespace, name);
            patched
        };
        self.notify(&patched);
        Ok(patched)
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> StoreResult<PersistentVolumeClaim> {
        let state = self.lock()?;
        lookup(&state.pvcs, key(namespace, name))
    }

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> StoreResult<PersistentVolumeClaim> {
        let created = {
            let mut state = self.lock()?;
            state.react(Verb::Create, PersistentVolumeClaim::KIND)?;
            let k = pvc.metadata.key();
            if state.pvcs.contains_key(&k) {
                return Err(StoreError::AlreadyExists {
                    kind: PersistentVolumeClaim::KIND,
                    key: k,
                });
            }
            let mut created = pvc.clone();
            created.metadata.resource_version = state.bump();
            state.pvcs.insert(k, created.clone());
            state.record(
                Verb::Create,
                PersistentVolumeClaim::KIND,
                &pvc.metadata.namespace,
                &pvc.metadata.name,
            );
            created
        };
        self.notify(&created);
        Ok(created)
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ObjectMeta, PipelineRunSpec, PipelineSource, TaskKind, TaskRunSpec, TaskRunTaskSource};

    fn run(name: &str) -> PipelineRun {
        PipelineRun {
            metadata: ObjectMeta::new("ns", name),
            spec: PipelineRunSpec {
                pipeline: PipelineSource::Ref {
                    name: "p".to_string(),
                },
                params: vec![],
                resources: vec![],
                workspaces: vec![],
                service_account_name: None,
                service_account_names: vec![],
                timeout: None,
                status: None,
            },
            status: Default::default(),
        }
    }

    fn task_run(name: &str) -> TaskRun {
        TaskRun {
            metadata: ObjectMeta::new("ns", name),
            spec: TaskRunSpec {
                task: TaskRunTaskSource::Ref {
                    name: "t".to_string(),
                    kind: TaskKind::Task,
                },
                params: vec![],
                resources: Default::default(),
                service_account_name: None,
                timeout: None,
                workspaces: vec![],
                artifact_storage: None,
                status: None,
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn stale_run_update_is_a_conflict() {
        let store = MemoryStore::new();
        store.add_pipeline_run(run("r"));

        let first = store.get_pipeline_run("ns", "r").await.unwrap();
        let stale = first.clone();
        store.update_pipeline_run(&first).await.unwrap();

        let err = store.update_pipeline_run(&stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.actions_of(Verb::Update, "PipelineRun").len(), 1);
    }

    #[tokio::test]
    async fn duplicate_task_run_create_is_rejected() {
        let store = MemoryStore::new();
        store.create_task_run(&task_run("a")).await.unwrap();

        let err = store.create_task_run(&task_run("a")).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.actions_of(Verb::Create, "TaskRun").len(), 1);
    }

    #[tokio::test]
    async fn one_shot_failure_only_fails_once() {
        let store = MemoryStore::new();
        store.add_task_run(task_run("a"));
        store.fail_next(Verb::Patch, "TaskRun", "boom");

        assert!(matches!(
            store.cancel_task_run("ns", "a").await,
            Err(StoreError::Backend(_))
        ));
        let patched = store.cancel_task_run("ns", "a").await.unwrap();
        assert!(patched.is_cancel_requested());
    }

    #[tokio::test]
    async fn writes_notify_the_owning_run() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        let mut tr = task_run("child");
        tr.metadata
            .labels
            .insert(labels::PIPELINE_RUN.to_string(), "r".to_string());

        store.create_task_run(&tr).await.unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, "TaskRun");
        assert_eq!(ev.run_key().as_deref(), Some("ns/r"));
    }
}
