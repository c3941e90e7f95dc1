// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! railtrack-coordinatord: the Coordinator process — Worker Registry (C1),
//! Task Dispatcher (C2), and Scheduler (C6), serving the wire protocol and
//! driving Agents for admitted runs (§2, §5 "separate OS processes").

use std::collections::HashMap;
use std::sync::Arc;

use railtrack_agent::AgentConfig;
use railtrack_core::{DagSpec, Queue, QueueKind, SystemClock};
use railtrack_coordinator::{
    AgentRunLauncher, Config, CoordinatorState, LogWriter, Scheduler, TaskDispatcher, WorkerRegistry,
};
use railtrack_storage::{DagRunStore, ProcStore, QueueStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(&config.dag_dir)?;

    let clock = SystemClock;
    let queue_store = Arc::new(QueueStore::new(&config.data_dir));
    let dagrun_store = Arc::new(DagRunStore::new(&config.data_dir));
    let proc_store = Arc::new(ProcStore::new(&config.data_dir, clock));
    let registry = Arc::new(WorkerRegistry::new(clock, config.worker_stale_ttl));
    let dispatcher = Arc::new(TaskDispatcher::new(clock, config.claim_ttl));

    let queues = discover_queues(&config.dag_dir);
    tracing::info!(count = queues.len(), "discovered queues from dag directory");

    let launcher = Arc::new(AgentRunLauncher::new(
        dagrun_store.clone(),
        &config.dag_dir,
        dispatcher.clone(),
        clock,
        AgentConfig::default(),
    ));
    let scheduler =
        Scheduler::new(queue_store, dagrun_store.clone(), proc_store, queues, config.scheduler_head_window, config.scheduler_tick);

    let scheduler_handle = tokio::spawn(async move { scheduler.run_forever(launcher).await });

    let sweeper_registry = registry.clone();
    let sweeper_dispatcher = dispatcher.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            for worker in sweeper_registry.sweep() {
                sweeper_dispatcher.reclaim_for_evicted_worker(&worker.worker_id);
            }
        }
    });

    let state = Arc::new(CoordinatorState {
        registry,
        dispatcher,
        dagrun_store,
        log_writer: Arc::new(LogWriter::new()),
        poll_timeout: std::time::Duration::from_secs(30),
    });

    let server = railtrack_coordinator::serve(&config.bind_addr, state);
    tokio::select! {
        result = server => result,
        _ = scheduler_handle => Ok(()),
    }
}

/// Scans `dag_dir` for `<name>.yaml` files and derives one `Queue` per
/// distinct `queue:` field (§4.6); DAGs without one get an implicit
/// per-DAG queue named after themselves.
fn discover_queues(dag_dir: &std::path::Path) -> Vec<Queue> {
    let mut queues: HashMap<String, Queue> = HashMap::new();
    let Ok(entries) = std::fs::read_dir(dag_dir) else { return Vec::new() };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else { continue };
        let Ok(spec) = DagSpec::from_yaml(&text) else { continue };
        register_queue(&mut queues, &spec);
    }

    queues.into_values().collect()
}

fn register_queue(queues: &mut HashMap<String, Queue>, spec: &DagSpec) {
    match &spec.queue {
        Some(name) => {
            queues.entry(name.clone()).or_insert_with(|| Queue {
                name: name.clone(),
                kind: QueueKind::Global { max_concurrency: spec.max_active_runs.unwrap_or(u32::MAX) },
            });
        }
        None => {
            queues.entry(spec.name.clone()).or_insert_with(|| Queue {
                name: spec.name.clone(),
                kind: QueueKind::PerDag { max_active_runs: spec.max_active_runs },
            });
        }
    }
}
