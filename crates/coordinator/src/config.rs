// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator configuration, loaded from the environment so the binary has
//! no required CLI flags (§1 ambient stack).

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the Queue/DAG-Run/Proc stores.
    pub data_dir: PathBuf,
    /// Directory of `<name>.yaml` DAG spec files the Agent resolves `call:`
    /// children and queue items against.
    pub dag_dir: PathBuf,
    /// Address the wire-protocol TCP server binds to.
    pub bind_addr: String,
    /// Worker eviction threshold (§4.1). Default 30 s.
    pub worker_stale_ttl: Duration,
    /// How long a claimed task stays `Claimed` before returning to `Pending`
    /// if unacknowledged (§4.2). Default 10 s.
    pub claim_ttl: Duration,
    /// Scheduler tick interval (§4.6). Default 500 ms.
    pub scheduler_tick: Duration,
    /// How many items the Scheduler inspects per queue per tick (§4.6).
    pub scheduler_head_window: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("RAILTRACK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./railtrack-data")),
            dag_dir: std::env::var("RAILTRACK_DAG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./railtrack-dags")),
            bind_addr: std::env::var("RAILTRACK_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:7420".to_string()),
            worker_stale_ttl: Duration::from_secs(env_u64("RAILTRACK_WORKER_STALE_TTL_SECS", 30)),
            claim_ttl: Duration::from_secs(env_u64("RAILTRACK_CLAIM_TTL_SECS", 10)),
            scheduler_tick: Duration::from_millis(env_u64("RAILTRACK_SCHEDULER_TICK_MS", 500)),
            scheduler_head_window: env_u64("RAILTRACK_SCHEDULER_HEAD_WINDOW", 32) as usize,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}
