// src/controller/queue.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use tracing::debug;

/// Exponential backoff: `base * 2^(failures - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// Rate-limited work queue of run keys.
///
/// Semantics:
/// - A key is queued at most once at a time; adding it again is a no-op.
/// - A key handed out by [`pop`](Self::pop) is not handed out again until
///   [`done`](Self::done) is called for it, so one run is never reconciled by
///   two workers at once.
/// - Adding a key while it is being processed marks it dirty; `done` then
///   queues it again.
/// - Failure counts per key drive the retry delay and are reset by
///   [`forget`](Self::forget).
#[derive(Debug)]
pub struct WorkQueue {
    pending: VecDeque<String>,
    queued: HashSet<String>,
    processing: HashSet<String>,
    dirty: HashSet<String>,
    failures: HashMap<String, u32>,
    backoff: Backoff,
}

impl WorkQueue {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            pending: VecDeque::new(),
            queued: HashSet::new(),
            processing: HashSet::new(),
            dirty: HashSet::new(),
            failures: HashMap::new(),
            backoff,
        }
    }

    /// Returns true if the key was newly queued.
    pub fn add(&mut self, key: &str) -> bool {
        if self.processing.contains(key) {
            let first = self.dirty.insert(key.to_string());
            debug!(key = %key, first, "key re-added while processing; deferring");
            return false;
        }
        if !self.queued.insert(key.to_string()) {
            return false;
        }
        self.pending.push_back(key.to_string());
        true
    }

    pub fn pop(&mut self) -> Option<String> {
        let key = self.pending.pop_front()?;
        self.queued.remove(&key);
        self.processing.insert(key.clone());
        Some(key)
    }

    pub fn done(&mut self, key: &str) {
        self.processing.remove(key);
        if self.dirty.remove(key) {
            self.add(key);
        }
    }

    /// Record a failed pass; returns the new failure count.
    pub fn record_failure(&mut self, key: &str) -> u32 {
        let n = self.failures.entry(key.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    pub fn retry_delay(&self, key: &str) -> Duration {
        self.backoff.delay(self.failures.get(key).copied().unwrap_or(0))
    }

    pub fn forget(&mut self, key: &str) {
        self.failures.remove(key);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Nothing queued and nothing being processed.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.processing.is_empty()
    }
}
