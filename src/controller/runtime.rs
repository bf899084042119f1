// src/controller/runtime.rs

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::reconciler::{ReconcileError, Reconciler};
use crate::store::WatchEvent;

use super::queue::{Backoff, WorkQueue};
use super::ControllerOptions;

/// Failed passes tolerated per key before giving up in `exit_when_idle` mode.
const IDLE_MODE_MAX_FAILURES: u32 = 5;

/// Drives reconciliation of every pipeline run in the store.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    options: ControllerOptions,
}

/// Mutable loop state, kept apart from `Controller` so handlers can borrow it.
struct LoopState {
    queue: WorkQueue,
    in_flight: JoinSet<Result<(), ReconcileError>>,
    keys: HashMap<Id, String>,
    retry_tx: mpsc::UnboundedSender<String>,
    delayed: usize,
}

impl Controller {
    pub fn new(reconciler: Arc<Reconciler>, options: ControllerOptions) -> Self {
        Self {
            reconciler,
            options,
        }
    }

    /// Main loop.
    ///
    /// Seeds the queue with every unfinished run, then reacts to watch
    /// events, retries and resync ticks until shut down (or, with
    /// `exit_when_idle`, until there is nothing left to do).
    pub async fn run(self) -> crate::errors::Result<()> {
        let cfg = self.reconciler.config().controller.clone();
        let store = Arc::clone(self.reconciler.store());
        info!(workers = cfg.workers, "controller started");

        let mut events = store.subscribe();
        let mut events_open = true;
        let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<String>();
        let mut state = LoopState {
            queue: WorkQueue::new(Backoff::new(cfg.backoff_base, cfg.backoff_max)),
            in_flight: JoinSet::new(),
            keys: HashMap::new(),
            retry_tx,
            delayed: 0,
        };

        self.resync(&mut state.queue).await;
        let mut resync = tokio::time::interval_at(
            Instant::now() + cfg.resync_interval,
            cfg.resync_interval,
        );
        resync.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Writes made by finished passes are already in the channel.
            while events_open {
                match events.try_recv() {
                    Ok(event) => Self::enqueue_event(&mut state.queue, &event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Lagged(missed)) => {
                        warn!(missed, "watch events dropped; resyncing");
                        self.resync(&mut state.queue).await;
                    }
                    Err(TryRecvError::Closed) => events_open = false,
                }
            }

            while state.in_flight.len() < cfg.workers {
                let Some(key) = state.queue.pop() else {
                    break;
                };
                self.dispatch(&mut state, key);
            }

            if self.options.exit_when_idle
                && state.in_flight.is_empty()
                && state.queue.is_idle()
                && state.delayed == 0
            {
                info!("no work left; controller exiting");
                break;
            }

            tokio::select! {
                Some(joined) = state.in_flight.join_next_with_id(), if !state.in_flight.is_empty() => {
                    self.finish(&mut state, joined);
                }
                event = events.recv(), if events_open => match event {
                    Ok(event) => Self::enqueue_event(&mut state.queue, &event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "watch events dropped; resyncing");
                        self.resync(&mut state.queue).await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("watch channel closed");
                        events_open = false;
                    }
                },
                Some(key) = retry_rx.recv() => {
                    state.delayed = state.delayed.saturating_sub(1);
                    state.queue.add(&key);
                }
                _ = resync.tick() => self.resync(&mut state.queue).await,
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        state.in_flight.shutdown().await;
        info!("controller exiting");
        Ok(())
    }

    fn enqueue_event(queue: &mut WorkQueue, event: &WatchEvent) {
        if let Some(key) = event.run_key() {
            let added = queue.add(&key);
            debug!(kind = event.kind, name = %event.name, run = %key, added, "watch event");
        }
    }

    /// Queue every run that has not finished.
    async fn resync(&self, queue: &mut WorkQueue) {
        match self.reconciler.store().list_pipeline_runs().await {
            Ok(runs) => {
                let mut added = 0;
                for run in runs.iter().filter(|r| !r.is_done()) {
                    if queue.add(&run.metadata.key()) {
                        added += 1;
                    }
                }
                debug!(total = runs.len(), added, "resynced pipeline runs");
            }
            Err(e) => warn!(error = %e, "failed to list pipeline runs for resync"),
        }
    }

    fn dispatch(&self, state: &mut LoopState, key: String) {
        let reconciler = Arc::clone(&self.reconciler);
        let task_key = key.clone();
        let handle = state
            .in_flight
            .spawn(async move { reconciler.reconcile(&task_key).await });
        debug!(run = %key, "dispatched reconcile pass");
        state.keys.insert(handle.id(), key);
    }

    fn finish(
        &self,
        state: &mut LoopState,
        joined: Result<(Id, Result<(), ReconcileError>), JoinError>,
    ) {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome.map_err(|e| e.to_string())),
            Err(e) => (e.id(), Err(format!("reconcile task aborted: {e}"))),
        };
        let Some(key) = state.keys.remove(&id) else {
            warn!(?id, "finished task has no key");
            return;
        };

        match outcome {
            Ok(()) => state.queue.forget(&key),
            Err(message) => {
                let failures = state.queue.record_failure(&key);
                if self.options.exit_when_idle && failures >= IDLE_MODE_MAX_FAILURES {
                    error!(run = %key, failures, error = %message, "giving up on run");
                    state.queue.forget(&key);
                } else {
                    let delay = state.queue.retry_delay(&key);
                    debug!(run = %key, failures, ?delay, error = %message, "requeueing after failure");
                    state.delayed += 1;
                    let tx = state.retry_tx.clone();
                    let retry_key = key.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(retry_key);
                    });
                }
            }
        }
        state.queue.done(&key);
    }
}
