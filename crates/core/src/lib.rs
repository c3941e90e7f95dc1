// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! railtrack-core: shared data model for the distributed DAG execution plane.

pub mod macros;

pub mod clock;
pub mod dagrun;
pub mod dagspec;
pub mod error;
pub mod id;
pub mod logstream;
pub mod proc;
pub mod queue;
pub mod task;
pub mod worker;

pub use clock::{Clock, FakeClock, SystemClock};
pub use dagrun::{DagRun, DagRunStatus, NodeState, NodeStatus, RunError, RunErrorKind, SubRunRef};
pub use dagspec::{
    DagSpec, HandlerSpec, ParallelSpec, RetryPolicy, StepSpec, DEFAULT_DISPATCH_TIMEOUT_SECS,
};
pub use error::CoreError;
pub use id::{short, IdBuf, ID_MAX_LEN};
pub use logstream::{LogChunk, LogStream};
pub use proc::ProcToken;
pub use queue::{Queue, QueueItem, QueueKind};
pub use task::{Operation, Task, TaskId, TaskOutcome, TaskStatus};
pub use worker::{Worker, WorkerId, WorkerStats};

crate::define_id! {
    /// Unique identifier for a DAG run.
    pub struct RunId("run-");
}

crate::define_id! {
    /// Unique identifier for a proc lease token.
    pub struct ProcTokenId("prc-");
}
