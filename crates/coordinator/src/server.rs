// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-protocol TCP server: the coordinator side of the worker/agent
//! transport described in §4.8 and §6.

use std::sync::Arc;

use railtrack_core::{Clock, DagRunStatus};
use railtrack_storage::DagRunStore;
use railtrack_wire::{read_message, write_message, ProtocolError, Request, Response};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::dispatcher::TaskDispatcher;
use crate::logwriter::LogWriter;
use crate::registry::WorkerRegistry;

pub struct CoordinatorState<C: Clock> {
    pub registry: Arc<WorkerRegistry<C>>,
    pub dispatcher: Arc<TaskDispatcher<C>>,
    pub dagrun_store: Arc<DagRunStore>,
    pub log_writer: Arc<LogWriter>,
    pub poll_timeout: std::time::Duration,
}

pub async fn serve<C: Clock>(bind_addr: &str, state: Arc<CoordinatorState<C>>) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "coordinator wire server listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, state).await {
                warn!(peer = %peer, error = %err, "connection closed with error");
            }
        });
    }
}

async fn handle_connection<C: Clock>(
    mut socket: TcpStream,
    state: Arc<CoordinatorState<C>>,
) -> Result<(), ProtocolError> {
    loop {
        let bytes = match read_message(&mut socket).await {
            Ok(bytes) => bytes,
            Err(ProtocolError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        };
        let request: Request = railtrack_wire::decode(&bytes)?;
        let response = handle_request(&state, request).await;
        let encoded = railtrack_wire::encode(&response)?;
        write_message(&mut socket, &encoded).await?;
    }
}

async fn handle_request<C: Clock>(state: &CoordinatorState<C>, request: Request) -> Response {
    match request {
        Request::Heartbeat { worker_id, labels, stats, running_tasks } => {
            let running_tasks =
                running_tasks.into_iter().map(|s| railtrack_core::TaskId::from_string(&s)).collect();
            state.registry.heartbeat(worker_id, labels, stats, running_tasks);
            Response::Ack
        }
        Request::Poll { worker_id, timeout_ms } => {
            let timeout = std::time::Duration::from_millis(timeout_ms).min(state.poll_timeout);
            let task = state.dispatcher.poll(&state.registry, &worker_id, timeout).await;
            Response::Dispatch { task }
        }
        Request::PushStatus { run_id, snapshot } => {
            state.log_writer.note_dag_name(run_id, &snapshot.dag_name);
            let handle = railtrack_storage::DagRunHandle { run_id };
            match state.dagrun_store.write_status(handle, &snapshot) {
                Ok(()) => {
                    if snapshot.status.is_terminal() {
                        let outcome = match snapshot.status {
                            DagRunStatus::Succeeded => railtrack_core::TaskOutcome::Succeeded,
                            DagRunStatus::Aborted | DagRunStatus::Cancelled => railtrack_core::TaskOutcome::Cancelled,
                            _ => railtrack_core::TaskOutcome::Failed,
                        };
                        state.dispatcher.ack_by_run(run_id, outcome);
                    }
                    Response::Accepted { cancelled: state.dispatcher.is_cancelled(run_id) }
                }
                Err(err) => {
                    error!(run_id = %run_id, error = %err, "failed to persist status snapshot");
                    Response::Error { message: err.to_string() }
                }
            }
        }
        Request::PushLog { chunk } => {
            let run_id = chunk.run_id;
            if state.log_writer.write_chunk(&state.dagrun_store, &chunk) {
                Response::Accepted { cancelled: state.dispatcher.is_cancelled(run_id) }
            } else {
                Response::Error { message: format!("unknown run {}", chunk.run_id) }
            }
        }
        Request::Cancel { run_id } => {
            state.dispatcher.cancel(run_id);
            Response::Ok
        }
        Request::GetWorkers => Response::Workers { workers: state.registry.workers() },
    }
}

/// Whether `status` should stop the wire server from accepting further
/// pushes for a run (used by tests exercising the terminal-status path).
pub fn is_terminal(status: DagRunStatus) -> bool {
    status.is_terminal()
}
