// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Requests sent worker→coordinator (and the admin `GetWorkers` query) over
//! the wire protocol (§6).

use std::collections::HashMap;

use railtrack_core::{DagRun, LogChunk, RunId, WorkerId, WorkerStats};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Must be called every ≤ 10 s; the coordinator evicts a worker that
    /// misses this for longer than its `stale_ttl` (§4.1).
    Heartbeat {
        worker_id: WorkerId,
        labels: HashMap<String, String>,
        stats: WorkerStats,
        running_tasks: Vec<String>,
    },
    /// Long-poll for a task whose selector matches this worker's labels.
    /// `timeout_ms` bounds how long the coordinator holds the request open.
    Poll { worker_id: WorkerId, timeout_ms: u64 },
    /// Whole-attempt status snapshot (§4.8). No partial patches.
    PushStatus { run_id: RunId, snapshot: DagRun },
    /// A single ordered log chunk, at most 64 KiB (§4.8).
    PushLog { chunk: LogChunk },
    /// Idempotent in either direction.
    Cancel { run_id: RunId },
    /// Admin/test-only query (§6 `GetWorkers`).
    GetWorkers,
}
