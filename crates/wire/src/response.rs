// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Responses sent coordinator→worker (§6).

use railtrack_core::{Task, Worker};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    /// Reply to `Heartbeat`.
    Ack,
    /// Reply to `Poll`: a task to run, or nothing if the long-poll timed out.
    Dispatch { task: Option<Task> },
    /// Reply to `PushStatus`/`PushLog`: `cancelled` is how a worker learns a
    /// run was cancelled, since it never receives an unsolicited push (§4.2
    /// `cancel`: "workers observe cancellation on their next status push").
    Accepted { cancelled: bool },
    Workers { workers: Vec<Worker> },
    Error { message: String },
}
