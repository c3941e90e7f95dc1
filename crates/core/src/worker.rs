// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identity and the registry's view of a live worker (§3, §4.1).

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use crate::task::TaskId;

/// Unique identifier for a worker process. Workers choose their own id
/// (typically hostname + pid); the registry does not mint these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Pollers-in-flight counters a worker reports on every heartbeat, used by
/// the dispatcher's load-balancing policy (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerStats {
    pub pollers_total: u32,
    pub pollers_busy: u32,
}

impl WorkerStats {
    /// Fraction of pollers currently busy, in `[0.0, 1.0]`. A worker with
    /// zero pollers reports as fully busy so it sorts last.
    pub fn busy_ratio(&self) -> f64 {
        if self.pollers_total == 0 {
            1.0
        } else {
            self.pollers_busy as f64 / self.pollers_total as f64
        }
    }
}

/// The coordinator's in-memory record of a live worker (§3 Worker, §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: WorkerId,
    pub labels: HashMap<String, String>,
    pub stats: WorkerStats,
    pub running_tasks: Vec<TaskId>,
    pub last_heartbeat_at_ms: u64,
}

impl Worker {
    /// Subset-match: does this worker's label map contain every `(k, v)` in
    /// `selector`? Case-sensitive, per §4.1.
    pub fn matches(&self, selector: &HashMap<String, String>) -> bool {
        selector.iter().all(|(k, v)| self.labels.get(k).map(|lv| lv == v).unwrap_or(false))
    }

    pub fn is_stale(&self, now_ms: u64, stale_ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_at_ms) > stale_ttl_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(labels: &[(&str, &str)]) -> Worker {
        Worker {
            worker_id: WorkerId::new("w1"),
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            stats: WorkerStats::default(),
            running_tasks: Vec::new(),
            last_heartbeat_at_ms: 0,
        }
    }

    #[test]
    fn matches_is_subset_and_case_sensitive() {
        let w = worker(&[("test", "true"), ("region", "us")]);
        let mut selector = HashMap::new();
        selector.insert("test".to_string(), "true".to_string());
        assert!(w.matches(&selector));

        selector.insert("Region".to_string(), "us".to_string());
        assert!(!w.matches(&selector));
    }

    #[test]
    fn empty_selector_matches_everything() {
        let w = worker(&[]);
        assert!(w.matches(&HashMap::new()));
    }

    #[test]
    fn busy_ratio_zero_pollers_is_fully_busy() {
        let stats = WorkerStats { pollers_total: 0, pollers_busy: 0 };
        assert_eq!(stats.busy_ratio(), 1.0);
    }

    #[test]
    fn staleness_uses_saturating_subtraction() {
        let w = worker(&[]);
        assert!(!w.is_stale(0, 30_000));
        assert!(w.is_stale(30_001, 30_000));
    }
}
