// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trait the Agent uses to hand a step off to a remote worker instead of
//! running it locally, when the step declares a `worker_selector` (§4.6
//! "distributed mode", §4.7 step 2).

use async_trait::async_trait;
use railtrack_core::{RunId, TaskOutcome};
use std::collections::HashMap;

#[async_trait]
pub trait StepDispatcher: Send + Sync {
    /// Submit a step for remote execution and await its terminal outcome.
    /// `dispatch_timeout` bounds how long to wait for a matching worker to
    /// even claim the task before failing with `NoMatchingWorker` (§4.7).
    async fn dispatch_step(
        &self,
        run_id: RunId,
        step_name: &str,
        command: &str,
        worker_selector: HashMap<String, String>,
        dispatch_timeout: std::time::Duration,
    ) -> Result<TaskOutcome, crate::error::AgentError>;
}
