// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task Dispatcher (C2, §4.2): long-poll task handoff between the
//! Scheduler/Agent (submitters) and Workers (pollers).

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use railtrack_core::{Clock, Task, TaskId, TaskOutcome, TaskStatus, WorkerId};
use tokio::sync::Notify;
use tokio::time::timeout as tokio_timeout;
use tracing::warn;

use crate::registry::WorkerRegistry;

struct Claimed {
    task: Task,
    worker_id: WorkerId,
    claimed_at_ms: u64,
}

pub struct TaskDispatcher<C: Clock> {
    pending: Mutex<VecDeque<Task>>,
    claimed: Mutex<HashMap<TaskId, Claimed>>,
    cancelled_runs: Mutex<std::collections::HashSet<railtrack_core::RunId>>,
    completed: Mutex<HashMap<railtrack_core::RunId, TaskOutcome>>,
    notify: Notify,
    clock: C,
    claim_ttl: Duration,
}

impl<C: Clock> TaskDispatcher<C> {
    pub fn new(clock: C, claim_ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            claimed: Mutex::new(HashMap::new()),
            cancelled_runs: Mutex::new(std::collections::HashSet::new()),
            completed: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            clock,
            claim_ttl,
        }
    }

    /// Admit a task to the pending pool (§4.2 `submit`).
    pub fn submit(&self, task: Task) -> TaskId {
        let task_id = task.task_id;
        self.pending.lock().push_back(task);
        self.notify.notify_waiters();
        task_id
    }

    /// Long-poll for a task whose selector matches `worker_id`'s labels.
    /// Blocks up to `poll_timeout`, waking early whenever a task is
    /// submitted or returned to the pool. Returns `None` on timeout or if
    /// the registry has no record of `worker_id` (§4.2).
    pub async fn poll(
        &self,
        registry: &WorkerRegistry<C>,
        worker_id: &WorkerId,
        poll_timeout: Duration,
    ) -> Option<Task> {
        let deadline = self.clock.now() + poll_timeout;
        loop {
            self.reclaim_expired();

            let Some(worker) = registry.get(worker_id) else { return None };
            if let Some(task) = self.take_matching(&worker.labels) {
                self.claimed.lock().insert(
                    task.task_id,
                    Claimed { task: task.clone(), worker_id: worker_id.clone(), claimed_at_ms: self.clock.epoch_ms() },
                );
                return Some(task);
            }

            let remaining = deadline.saturating_duration_since(self.clock.now());
            if remaining.is_zero() {
                return None;
            }
            let notified = self.notify.notified();
            if tokio_timeout(remaining.min(Duration::from_millis(200)), notified).await.is_err() {
                // periodic wake to re-check claim-ttl reclamation even with no submit
            }
            if self.clock.now() >= deadline {
                return None;
            }
        }
    }

    fn take_matching(&self, labels: &HashMap<String, String>) -> Option<Task> {
        let mut pending = self.pending.lock();
        let idx = pending.iter().position(|t| t.worker_selector.iter().all(|(k, v)| labels.get(k) == Some(v)))?;
        pending.remove(idx)
    }

    /// Worker-reported outcome for a previously claimed task (§4.2 `ack`).
    /// Removes the task from in-flight; returns `None` if it was already
    /// reclaimed (claim expired, or the run was cancelled).
    pub fn ack(&self, task_id: TaskId, outcome: TaskOutcome) -> Option<TaskStatus> {
        self.claimed.lock().remove(&task_id).map(|_| TaskStatus::Acked(outcome))
    }

    /// The wire protocol carries a task's outcome implicitly in its terminal
    /// `PushStatus` snapshot rather than a separate Ack method (§6); this
    /// finds the claimed task by `run_id` and acks it the same way.
    pub fn ack_by_run(&self, run_id: railtrack_core::RunId, outcome: TaskOutcome) -> Option<TaskStatus> {
        let task_id = {
            let claimed = self.claimed.lock();
            claimed.iter().find(|(_, c)| c.task.run_id == run_id).map(|(id, _)| *id)
        }?;
        self.completed.lock().insert(run_id, outcome);
        self.notify.notify_waiters();
        self.ack(task_id, outcome)
    }

    /// Waits up to `timeout` for `ack_by_run` to record an outcome for
    /// `run_id` (used by an in-process `StepDispatcher` to learn a
    /// dispatched step's result without a dedicated wire Ack method, §4.6).
    pub async fn await_outcome(&self, run_id: railtrack_core::RunId, timeout: Duration) -> Option<TaskOutcome> {
        let deadline = self.clock.now() + timeout;
        loop {
            if let Some(outcome) = self.completed.lock().remove(&run_id) {
                return Some(outcome);
            }
            let remaining = deadline.saturating_duration_since(self.clock.now());
            if remaining.is_zero() {
                return None;
            }
            let notified = self.notify.notified();
            let _ = tokio_timeout(remaining.min(Duration::from_millis(200)), notified).await;
            if self.clock.now() >= deadline {
                return None;
            }
        }
    }

    /// Mark every pending/claimed task for `run_id` cancelled (§4.2 `cancel`).
    /// Idempotent.
    pub fn cancel(&self, run_id: railtrack_core::RunId) {
        self.cancelled_runs.lock().insert(run_id);
        self.pending.lock().retain(|t| t.run_id != run_id);
        self.claimed.lock().retain(|_, c| c.task.run_id != run_id);
    }

    pub fn is_cancelled(&self, run_id: railtrack_core::RunId) -> bool {
        self.cancelled_runs.lock().contains(&run_id)
    }

    /// Return claimed tasks past their `claim_ttl` to the pending pool
    /// (§4.2: `Claimed → Pending` on claim timeout).
    fn reclaim_expired(&self) {
        let now = self.clock.epoch_ms();
        let ttl_ms = self.claim_ttl.as_millis() as u64;
        let mut claimed = self.claimed.lock();
        let expired: Vec<TaskId> =
            claimed.iter().filter(|(_, c)| now.saturating_sub(c.claimed_at_ms) > ttl_ms).map(|(id, _)| *id).collect();
        for task_id in expired {
            if let Some(entry) = claimed.remove(&task_id) {
                warn!(task_id = %task_id, worker_id = %entry.worker_id, "task claim expired, returning to pending");
                self.pending.lock().push_back(entry.task);
            }
        }
        drop(claimed);
        if !self.pending.lock().is_empty() {
            self.notify.notify_waiters();
        }
    }

    /// Evicted workers' in-flight tasks surface as lost and are re-queued
    /// (§4.1 sweeper integration).
    pub fn reclaim_for_evicted_worker(&self, worker_id: &WorkerId) {
        let mut claimed = self.claimed.lock();
        let lost: Vec<TaskId> = claimed.iter().filter(|(_, c)| &c.worker_id == worker_id).map(|(id, _)| *id).collect();
        for task_id in lost {
            if let Some(entry) = claimed.remove(&task_id) {
                self.pending.lock().push_back(entry.task);
            }
        }
        drop(claimed);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railtrack_core::{FakeClock, Operation, RunId, TaskId, WorkerStats};

    fn task(selector: HashMap<String, String>) -> Task {
        Task {
            task_id: TaskId::new(),
            dag_spec: String::new(),
            run_id: RunId::new(),
            parent_run_id: None,
            root_run_id: None,
            params: Vec::new(),
            worker_selector: selector,
            target_step: None,
            operation: Operation::Start,
        }
    }

    #[tokio::test]
    async fn poll_returns_submitted_task_matching_labels() {
        let clock = FakeClock::new();
        let registry = WorkerRegistry::new(clock.clone(), Duration::from_secs(30));
        let dispatcher = TaskDispatcher::new(clock, Duration::from_secs(10));

        let mut labels = HashMap::new();
        labels.insert("region".to_string(), "us".to_string());
        registry.heartbeat(WorkerId::new("w1"), labels.clone(), WorkerStats::default(), Vec::new());

        let mut selector = HashMap::new();
        selector.insert("region".to_string(), "us".to_string());
        let submitted = task(selector);
        dispatcher.submit(submitted.clone());

        let polled =
            dispatcher.poll(&registry, &WorkerId::new("w1"), Duration::from_millis(500)).await.expect("task");
        assert_eq!(polled.task_id, submitted.task_id);
    }

    #[tokio::test]
    async fn poll_times_out_with_no_matching_task() {
        let clock = FakeClock::new();
        let registry = WorkerRegistry::new(clock.clone(), Duration::from_secs(30));
        let dispatcher: TaskDispatcher<FakeClock> = TaskDispatcher::new(clock.clone(), Duration::from_secs(10));
        registry.heartbeat(WorkerId::new("w1"), HashMap::new(), WorkerStats::default(), Vec::new());

        let poll_fut = dispatcher.poll(&registry, &WorkerId::new("w1"), Duration::from_millis(50));
        tokio::pin!(poll_fut);
        tokio::time::sleep(Duration::from_millis(10)).await;
        clock.advance(Duration::from_millis(60));
        let result = poll_fut.await;
        assert!(result.is_none());
    }

    #[test]
    fn cancel_removes_pending_tasks_for_run() {
        let clock = FakeClock::new();
        let dispatcher = TaskDispatcher::new(clock, Duration::from_secs(10));
        let t = task(HashMap::new());
        let run_id = t.run_id;
        dispatcher.submit(t);

        dispatcher.cancel(run_id);
        assert!(dispatcher.is_cancelled(run_id));
        assert!(dispatcher.pending.lock().is_empty());
    }
}
