// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task: the unit of dispatch handed from the Coordinator to a Worker (§3, §4.2).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::RunId;

crate::define_id! {
    /// Unique identifier for a dispatched task.
    pub struct TaskId("tsk-");
}

/// What operation the worker should perform on the given run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Start,
    Retry,
    Resume,
}

/// A unit of work submitted to the dispatcher for delivery to a matching
/// worker (§3 Task).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    /// Inline DAG spec text (YAML/JSON), or a reference the worker resolves.
    pub dag_spec: String,
    pub run_id: RunId,
    pub parent_run_id: Option<RunId>,
    pub root_run_id: Option<RunId>,
    pub params: Vec<(String, String)>,
    pub worker_selector: HashMap<String, String>,
    pub target_step: Option<String>,
    pub operation: Operation,
}

impl Task {
    pub fn root_run_id(&self) -> RunId {
        self.root_run_id.unwrap_or(self.run_id)
    }
}

/// Advisory outcome a worker reports when acknowledging a task (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Lost,
    Cancelled,
}

/// Dispatcher-side lifecycle of a single task (§4.2 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Claimed,
    Acked(TaskOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_run_id_defaults_to_self() {
        let run_id = RunId::new();
        let task = Task {
            task_id: TaskId::new(),
            dag_spec: String::new(),
            run_id,
            parent_run_id: None,
            root_run_id: None,
            params: Vec::new(),
            worker_selector: HashMap::new(),
            target_step: None,
            operation: Operation::Start,
        };
        assert_eq!(task.root_run_id(), run_id);
    }
}
