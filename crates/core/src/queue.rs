// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue and QueueItem data model (§3).

use serde::{Deserialize, Serialize};

use crate::RunId;

/// An admitted run intent waiting for the Scheduler to pick it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue_name: String,
    pub dag_name: String,
    pub run_id: RunId,
    pub params: Vec<(String, String)>,
    pub enqueued_at_ms: u64,
}

impl QueueItem {
    /// Unique key for dedup/lookup: `(queue_name, dag_name, run_id)`.
    pub fn key(&self) -> (String, String, RunId) {
        (self.queue_name.clone(), self.dag_name.clone(), self.run_id)
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    /// FIFO by `enqueued_at`, tie-broken by lexicographic `run_id` (§3 Queue Item).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.enqueued_at_ms
            .cmp(&other.enqueued_at_ms)
            .then_with(|| self.run_id.as_str().cmp(other.run_id.as_str()))
    }
}

/// Whether a queue enforces concurrency across every DAG that uses it, or is
/// scoped to a single DAG's own `max_active_runs` (§3 Queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueKind {
    /// Named, shared queue with a hard `max_concurrency` across all DAGs.
    Global { max_concurrency: u32 },
    /// One queue per DAG; unlimited unless the DAG sets `max_active_runs`.
    PerDag { max_active_runs: Option<u32> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    pub kind: QueueKind,
}

impl Queue {
    pub fn max_concurrency(&self) -> Option<u32> {
        match self.kind {
            QueueKind::Global { max_concurrency } => Some(max_concurrency),
            QueueKind::PerDag { max_active_runs } => max_active_runs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(run_id: &str, enqueued_at_ms: u64) -> QueueItem {
        QueueItem {
            queue_name: "q".into(),
            dag_name: "d".into(),
            run_id: RunId::from_string(run_id),
            params: Vec::new(),
            enqueued_at_ms,
        }
    }

    #[test]
    fn ordering_is_fifo_by_enqueued_at() {
        let a = item("run-aaaaaaaaaaaaaaaaaaa", 1);
        let b = item("run-zzzzzzzzzzzzzzzzzzz", 2);
        assert!(a < b);
    }

    #[test]
    fn ties_break_lexicographically_on_run_id() {
        let a = item("run-aaaaaaaaaaaaaaaaaaa", 5);
        let b = item("run-bbbbbbbbbbbbbbbbbbb", 5);
        assert!(a < b);
    }

    #[test]
    fn global_queue_caps_total_concurrency() {
        let q = Queue { name: "shared".into(), kind: QueueKind::Global { max_concurrency: 4 } };
        assert_eq!(q.max_concurrency(), Some(4));
    }

    #[test]
    fn per_dag_queue_defaults_unlimited() {
        let q =
            Queue { name: "d".into(), kind: QueueKind::PerDag { max_active_runs: None } };
        assert_eq!(q.max_concurrency(), None);
    }
}
