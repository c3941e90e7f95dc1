// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker main loop: heartbeat, long-poll for tasks, execute the dispatched
//! step locally, stream its logs back, and report its terminal outcome
//! (§3 Worker, §4.2, §4.7 step 2, §4.8).

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use railtrack_core::{
    Clock, DagRun, DagRunStatus, DagSpec, LogChunk, LogStream, NodeState, NodeStatus, RunId, SystemClock, Task,
    TaskId, WorkerStats,
};
use railtrack_wire::{Request, Response};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::WireClient;
use crate::config::WorkerConfig;
use crate::error::WorkerError;

pub struct Worker {
    config: WorkerConfig,
    running: Mutex<HashSet<TaskId>>,
    busy: AtomicU32,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Arc<Self> {
        Arc::new(Self { config, running: Mutex::new(HashSet::new()), busy: AtomicU32::new(0) })
    }

    /// Runs heartbeat and poll loops until the process is killed. Every
    /// poller is an independent `tokio` task, so one step's cancellation
    /// watcher or subprocess never blocks another (§5 concurrency model).
    pub async fn run(self: Arc<Self>) {
        let heartbeat = tokio::spawn(self.clone().heartbeat_loop());
        let mut pollers = Vec::new();
        for _ in 0..self.config.concurrency.max(1) {
            pollers.push(tokio::spawn(self.clone().poll_loop()));
        }
        let _ = heartbeat.await;
        for poller in pollers {
            let _ = poller.await;
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        loop {
            if let Err(err) = self.send_heartbeat().await {
                warn!(error = %err, "heartbeat failed");
            }
            tokio::time::sleep(self.config.heartbeat_interval).await;
        }
    }

    async fn send_heartbeat(&self) -> Result<(), WorkerError> {
        let mut client = WireClient::connect(&self.config.coordinator_addr).await?;
        let running_tasks = self.running.lock().iter().map(|id| id.to_string()).collect();
        let stats = WorkerStats {
            pollers_total: self.config.concurrency,
            pollers_busy: self.busy.load(Ordering::Relaxed),
        };
        let request = Request::Heartbeat {
            worker_id: self.config.worker_id.clone(),
            labels: self.config.labels.clone(),
            stats,
            running_tasks,
        };
        client.call(&request).await?;
        Ok(())
    }

    async fn poll_loop(self: Arc<Self>) {
        loop {
            match self.poll_once().await {
                Ok(Some(task)) => {
                    self.running.lock().insert(task.task_id);
                    self.busy.fetch_add(1, Ordering::Relaxed);
                    self.execute_task(&task).await;
                    self.running.lock().remove(&task.task_id);
                    self.busy.fetch_sub(1, Ordering::Relaxed);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "poll failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<Option<Task>, WorkerError> {
        let mut client = WireClient::connect(&self.config.coordinator_addr).await?;
        let request = Request::Poll {
            worker_id: self.config.worker_id.clone(),
            timeout_ms: self.config.poll_timeout.as_millis() as u64,
        };
        match client.call(&request).await? {
            Response::Dispatch { task } => Ok(task),
            other => Err(WorkerError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Runs one dispatched step, per §4.6's synthetic single-step task
    /// scheme: `task.dag_spec` is a one-step `DagSpec`, `task.target_step`
    /// names the step to run within it.
    async fn execute_task(&self, task: &Task) {
        let step_name = task.target_step.clone().unwrap_or_default();

        let spec = match DagSpec::from_yaml(&task.dag_spec) {
            Ok(spec) => spec,
            Err(err) => {
                self.push_terminal(task, &step_name, NodeStatus::Failed, format!("invalid dag spec: {err}")).await;
                return;
            }
        };
        let Some(step) = spec.step(&step_name).cloned() else {
            self.push_terminal(task, &step_name, NodeStatus::Failed, format!("unknown step {step_name:?}")).await;
            return;
        };

        info!(run_id = %task.run_id, step = %step_name, "executing dispatched step");
        let running_snapshot = self.push_running(task, &step_name).await;

        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_for_cancellation(
            self.config.coordinator_addr.clone(),
            running_snapshot,
            cancel.clone(),
        ));

        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let (err_tx, err_rx) = mpsc::unbounded_channel::<String>();
        let out_pusher = tokio::spawn(push_log_lines(
            self.config.coordinator_addr.clone(),
            task.run_id,
            step_name.clone(),
            LogStream::Stdout,
            out_rx,
        ));
        let err_pusher = tokio::spawn(push_log_lines(
            self.config.coordinator_addr.clone(),
            task.run_id,
            step_name.clone(),
            LogStream::Stderr,
            err_rx,
        ));

        let command = step.command.clone().unwrap_or_default();
        let result = railtrack_agent::run_step(
            &command,
            step.output.as_deref(),
            cancel.clone(),
            self.config.shutdown_grace,
            |line| {
                let _ = out_tx.send(line.to_string());
            },
            |line| {
                let _ = err_tx.send(line.to_string());
            },
        )
        .await;

        drop(out_tx);
        drop(err_tx);
        watcher.abort();
        let _ = out_pusher.await;
        let _ = err_pusher.await;

        match result {
            Ok(outcome) => {
                let mut variables = std::collections::HashMap::new();
                if let (Some(name), Some(value)) = (step.output.as_deref(), outcome.output_value) {
                    variables.insert(name.to_string(), value);
                }
                self.push_terminal_with_vars(task, &step_name, NodeStatus::Succeeded, None, variables).await;
            }
            Err(railtrack_agent::ExecError::Cancelled) => {
                self.push_terminal(task, &step_name, NodeStatus::Aborted, "cancelled".to_string()).await;
            }
            Err(err) => {
                self.push_terminal(task, &step_name, NodeStatus::Failed, err.to_string()).await;
            }
        }
    }

    async fn push_running(&self, task: &Task, step_name: &str) -> DagRun {
        let mut node = NodeState::pending(step_name);
        node.status = NodeStatus::Running;
        node.started_at_ms = Some(SystemClock.epoch_ms());
        let run = single_node_run(task, step_name, DagRunStatus::Running, node);
        let _ = self.push_status(task.run_id, run.clone()).await;
        run
    }

    async fn push_terminal(&self, task: &Task, step_name: &str, status: NodeStatus, error: String) {
        self.push_terminal_inner(task, step_name, status, Some(error), std::collections::HashMap::new()).await;
    }

    async fn push_terminal_with_vars(
        &self,
        task: &Task,
        step_name: &str,
        status: NodeStatus,
        error: Option<String>,
        variables: std::collections::HashMap<String, String>,
    ) {
        self.push_terminal_inner(task, step_name, status, error, variables).await;
    }

    async fn push_terminal_inner(
        &self,
        task: &Task,
        step_name: &str,
        status: NodeStatus,
        error: Option<String>,
        variables: std::collections::HashMap<String, String>,
    ) {
        let mut node = NodeState::pending(step_name);
        node.status = status;
        node.started_at_ms = Some(SystemClock.epoch_ms());
        node.finished_at_ms = Some(SystemClock.epoch_ms());
        node.output_variables = variables;
        node.error = error;

        let run_status = match status {
            NodeStatus::Succeeded => DagRunStatus::Succeeded,
            NodeStatus::Aborted => DagRunStatus::Aborted,
            _ => DagRunStatus::Failed,
        };
        let run = single_node_run(task, step_name, run_status, node);
        let _ = self.push_status(task.run_id, run).await;
    }

    async fn push_status(&self, run_id: RunId, run: DagRun) -> Result<(), WorkerError> {
        let mut client = WireClient::connect(&self.config.coordinator_addr).await?;
        client.call(&Request::PushStatus { run_id, snapshot: run }).await?;
        Ok(())
    }
}

fn single_node_run(task: &Task, _step_name: &str, status: DagRunStatus, node: NodeState) -> DagRun {
    let mut run = DagRun::new(format!("step:{}", node.step_name), task.run_id, task.params.clone());
    run.parent_run_id = task.parent_run_id;
    run.root_run_id = task.root_run_id;
    run.status = status;
    run.started_at_ms = node.started_at_ms;
    run.finished_at_ms = node.finished_at_ms;
    run.nodes = vec![node];
    run
}

/// Periodically re-pushes the same `Running` snapshot already on file, just
/// to read back the `Accepted.cancelled` flag (§4.2 `cancel`: "workers
/// observe cancellation on their next status push").
async fn watch_for_cancellation(coordinator_addr: String, running_snapshot: DagRun, cancel: CancellationToken) {
    let run_id = running_snapshot.run_id;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {}
        }
        let Ok(mut client) = WireClient::connect(&coordinator_addr).await else { continue };
        let request = Request::PushStatus { run_id, snapshot: running_snapshot.clone() };
        if let Ok(Response::Accepted { cancelled: true }) = client.call(&request).await {
            cancel.cancel();
            return;
        }
    }
}

async fn push_log_lines(
    addr: String,
    run_id: RunId,
    step_name: String,
    stream: LogStream,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    let mut client = match WireClient::connect(&addr).await {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "failed to open log-push connection");
            return;
        }
    };
    let mut offset: u64 = 0;
    while let Some(line) = rx.recv().await {
        let mut data = line.into_bytes();
        data.push(b'\n');
        let chunk = LogChunk { run_id, step_name: step_name.clone(), stream, offset, data };
        offset = chunk.end_offset();
        if let Err(err) = client.call(&Request::PushLog { chunk }).await {
            warn!(error = %err, "failed to push log chunk");
        }
    }
}
