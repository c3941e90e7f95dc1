// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DAG-Run and NodeState: the attempt-scoped status snapshot persisted by
//! the DAG-Run Store and streamed between worker and coordinator (§3, §4.4, §4.8).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::RunId;

/// Run-level status (§3 DAG-Run). Advances monotonically except that
/// `Running → Running` is permitted for child attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagRunStatus {
    NotStarted,
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    PartialSuccess,
    Aborted,
}

impl DagRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DagRunStatus::Succeeded
                | DagRunStatus::Failed
                | DagRunStatus::Cancelled
                | DagRunStatus::PartialSuccess
                | DagRunStatus::Aborted
        )
    }
}

crate::simple_display! {
    DagRunStatus {
        NotStarted => "not_started",
        Queued => "queued",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
        PartialSuccess => "partial_success",
        Aborted => "aborted",
    }
}

/// Per-node status (§3 NodeState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Aborted,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Aborted | NodeStatus::Skipped
        )
    }

    /// Whether a downstream node may treat this predecessor as satisfied for
    /// normal (non-`continue_on_failure`) dependency evaluation.
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, NodeStatus::Succeeded)
    }
}

crate::simple_display! {
    NodeStatus {
        NotStarted => "not_started",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Aborted => "aborted",
        Skipped => "skipped",
    }
}

/// A child run spawned by a `call:` or `parallel` step (§3 NodeState.sub_runs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRunRef {
    pub run_id: RunId,
    pub dag_name: String,
    pub params: Vec<(String, String)>,
}

/// Runtime record of a single DAG step within one attempt (§3 NodeState).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub step_name: String,
    pub status: NodeStatus,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    pub stdout_path: Option<String>,
    pub stderr_path: Option<String>,
    pub output_variables: HashMap<String, String>,
    pub sub_runs: Vec<SubRunRef>,
    pub error: Option<String>,
}

impl NodeState {
    pub fn pending(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: NodeStatus::NotStarted,
            started_at_ms: None,
            finished_at_ms: None,
            stdout_path: None,
            stderr_path: None,
            output_variables: HashMap::new(),
            sub_runs: Vec::new(),
            error: None,
        }
    }

    /// §3 invariant: `status = Succeeded ⇒ finished_at ≥ started_at`.
    pub fn is_well_formed(&self) -> bool {
        if self.status == NodeStatus::Succeeded {
            match (self.started_at_ms, self.finished_at_ms) {
                (Some(start), Some(finish)) => finish >= start,
                _ => false,
            }
        } else {
            true
        }
    }
}

/// A structured, user-visible run failure (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    InvalidGraph,
    NodeFailed,
    NoMatchingWorker,
    WorkerLost,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub message: String,
    pub step: Option<String>,
}

/// The full attempt-scoped snapshot persisted by the DAG-Run Store and
/// pushed over the status channel (§3 DAG-Run, §4.4, §4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagRun {
    pub dag_name: String,
    pub run_id: RunId,
    pub parent_run_id: Option<RunId>,
    pub root_run_id: Option<RunId>,
    pub status: DagRunStatus,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    pub params: Vec<(String, String)>,
    pub nodes: Vec<NodeState>,
    pub error: Option<RunError>,
}

impl DagRun {
    pub fn new(dag_name: impl Into<String>, run_id: RunId, params: Vec<(String, String)>) -> Self {
        Self {
            dag_name: dag_name.into(),
            run_id,
            parent_run_id: None,
            root_run_id: None,
            status: DagRunStatus::NotStarted,
            started_at_ms: None,
            finished_at_ms: None,
            params,
            nodes: Vec::new(),
            error: None,
        }
    }

    pub fn node_mut(&mut self, step_name: &str) -> Option<&mut NodeState> {
        self.nodes.iter_mut().find(|n| n.step_name == step_name)
    }

    pub fn node(&self, step_name: &str) -> Option<&NodeState> {
        self.nodes.iter().find(|n| n.step_name == step_name)
    }

    /// §4.7 step 4: compute the run's terminal status from its node statuses.
    /// Returns `None` if any node is still non-terminal.
    pub fn compute_terminal_status(&self) -> Option<DagRunStatus> {
        if self.nodes.iter().any(|n| n.status == NodeStatus::Running) {
            return None;
        }
        let any_aborted = self.nodes.iter().any(|n| n.status == NodeStatus::Aborted);
        let any_failed = self.nodes.iter().any(|n| n.status == NodeStatus::Failed);
        let any_succeeded = self.nodes.iter().any(|n| n.status == NodeStatus::Succeeded);

        Some(if any_aborted {
            DagRunStatus::Aborted
        } else if any_failed && !any_succeeded {
            DagRunStatus::Failed
        } else if any_failed && any_succeeded {
            DagRunStatus::PartialSuccess
        } else {
            DagRunStatus::Succeeded
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with(statuses: &[NodeStatus]) -> DagRun {
        let mut run = DagRun::new("d", RunId::new(), Vec::new());
        for (i, status) in statuses.iter().enumerate() {
            let mut node = NodeState::pending(format!("step{i}"));
            node.status = *status;
            run.nodes.push(node);
        }
        run
    }

    #[test]
    fn all_succeeded_is_succeeded() {
        let run = run_with(&[NodeStatus::Succeeded, NodeStatus::Succeeded]);
        assert_eq!(run.compute_terminal_status(), Some(DagRunStatus::Succeeded));
    }

    #[test]
    fn all_failed_no_success_is_failed() {
        let run = run_with(&[NodeStatus::Failed, NodeStatus::Failed]);
        assert_eq!(run.compute_terminal_status(), Some(DagRunStatus::Failed));
    }

    #[test]
    fn mixed_success_and_failure_is_partial_success() {
        let run = run_with(&[NodeStatus::Succeeded, NodeStatus::Failed]);
        assert_eq!(run.compute_terminal_status(), Some(DagRunStatus::PartialSuccess));
    }

    #[test]
    fn aborted_overrides_partial_success() {
        let run = run_with(&[NodeStatus::Succeeded, NodeStatus::Failed, NodeStatus::Aborted]);
        assert_eq!(run.compute_terminal_status(), Some(DagRunStatus::Aborted));
    }

    #[test]
    fn still_running_yields_none() {
        let run = run_with(&[NodeStatus::Succeeded, NodeStatus::Running]);
        assert_eq!(run.compute_terminal_status(), None);
    }

    #[test]
    fn well_formed_requires_finish_after_start_when_succeeded() {
        let mut node = NodeState::pending("s");
        node.status = NodeStatus::Succeeded;
        node.started_at_ms = Some(10);
        node.finished_at_ms = Some(5);
        assert!(!node.is_well_formed());
        node.finished_at_ms = Some(10);
        assert!(node.is_well_formed());
    }
}
