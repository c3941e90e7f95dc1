// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! railtrack-workerd: the Worker process — polls the Coordinator for
//! dispatched steps and executes them locally (§2, §3 Worker).

use railtrack_worker::{Worker, WorkerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(
        worker_id = %config.worker_id,
        coordinator = %config.coordinator_addr,
        concurrency = config.concurrency,
        "starting worker"
    );

    Worker::new(config).run().await;
}
