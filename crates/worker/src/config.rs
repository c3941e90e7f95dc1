// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker configuration, loaded from the environment (§1 ambient stack,
//! matching the coordinator's `Config::from_env` convention).

use std::collections::HashMap;
use std::time::Duration;

use railtrack_core::WorkerId;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `host:port` of the coordinator's wire-protocol listener.
    pub coordinator_addr: String,
    /// Opaque identity this worker presents on every request. Workers mint
    /// their own id (§3 Worker) — the registry never assigns one.
    pub worker_id: WorkerId,
    /// Label set matched against DAG/step `worker_selector`s (§4.1).
    pub labels: HashMap<String, String>,
    /// Cadence of `Heartbeat` calls. Must stay well under the coordinator's
    /// `worker_stale_ttl` (default 30 s) or this worker gets evicted.
    pub heartbeat_interval: Duration,
    /// How long a single `Poll` call blocks waiting for a matching task.
    pub poll_timeout: Duration,
    /// Grace window given to a running command after cancellation before
    /// it's force-killed (§4.7 Cancellation).
    pub shutdown_grace: Duration,
    /// Number of steps this worker executes concurrently.
    pub concurrency: u32,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            coordinator_addr: std::env::var("RAILTRACK_COORDINATOR_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:7420".to_string()),
            worker_id: std::env::var("RAILTRACK_WORKER_ID")
                .map(WorkerId::new)
                .unwrap_or_else(|_| WorkerId::new(default_worker_id())),
            labels: parse_labels(&std::env::var("RAILTRACK_WORKER_LABELS").unwrap_or_default()),
            heartbeat_interval: Duration::from_secs(env_u64("RAILTRACK_HEARTBEAT_INTERVAL_SECS", 5)),
            poll_timeout: Duration::from_secs(env_u64("RAILTRACK_POLL_TIMEOUT_SECS", 25)),
            shutdown_grace: Duration::from_secs(env_u64("RAILTRACK_SHUTDOWN_GRACE_SECS", 30)),
            concurrency: env_u64("RAILTRACK_WORKER_CONCURRENCY", 4) as u32,
        }
    }
}

fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{host}-{}", std::process::id())
}

/// Parses `k=v,k2=v2` label strings (§1 ambient stack: no CLI flags).
fn parse_labels(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_labels_splits_pairs() {
        let labels = parse_labels("region=us,gpu=true");
        assert_eq!(labels.get("region").map(String::as_str), Some("us"));
        assert_eq!(labels.get("gpu").map(String::as_str), Some("true"));
    }

    #[test]
    fn parse_labels_empty_string_yields_empty_map() {
        assert!(parse_labels("").is_empty());
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}
