// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler (C6, §4.6): single-process admission loop that promotes queued
//! runs into active Agents, bounded by each queue's `max_concurrency`.

use std::sync::Arc;
use std::time::Duration;

use railtrack_core::{Clock, Queue, QueueKind};
use railtrack_storage::{DagRunStore, ProcStore, QueueStore, StorageError};
use tracing::{debug, warn};

/// Spawns one Agent per admitted queue item. Kept generic over the actual
/// run-starting action so the coordinator binary can inject the real Agent
/// spawn while tests use a recording stub.
#[async_trait::async_trait]
pub trait RunLauncher: Send + Sync {
    async fn launch(&self, dag_name: &str, run_id: railtrack_core::RunId, params: Vec<(String, String)>);
}

pub struct Scheduler<C: Clock> {
    queue_store: Arc<QueueStore>,
    dagrun_store: Arc<DagRunStore>,
    proc_store: Arc<ProcStore<C>>,
    queues: Vec<Queue>,
    head_window: usize,
    tick_interval: Duration,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        queue_store: Arc<QueueStore>,
        dagrun_store: Arc<DagRunStore>,
        proc_store: Arc<ProcStore<C>>,
        queues: Vec<Queue>,
        head_window: usize,
        tick_interval: Duration,
    ) -> Self {
        Self { queue_store, dagrun_store, proc_store, queues, head_window, tick_interval }
    }

    /// Runs the 500 ms admission loop forever. Intended to be
    /// `tokio::spawn`ed by the coordinator binary.
    pub async fn run_forever(&self, launcher: Arc<dyn RunLauncher>) {
        loop {
            if let Err(err) = self.tick(launcher.as_ref()).await {
                warn!(error = %err, "scheduler tick failed");
            }
            tokio::time::sleep(self.tick_interval).await;
        }
    }

    /// One admission pass over every configured queue (§4.6 pseudocode).
    pub async fn tick(&self, launcher: &dyn RunLauncher) -> Result<(), StorageError> {
        for queue in &self.queues {
            self.tick_queue(queue, launcher).await?;
        }
        Ok(())
    }

    async fn tick_queue(&self, queue: &Queue, launcher: &dyn RunLauncher) -> Result<(), StorageError> {
        let items = self.queue_store.list(&queue.name)?;
        let mut running = self.running_count(queue)?;

        for item in items.into_iter().take(self.head_window) {
            if let Some(max) = queue.max_concurrency() {
                if running >= max as usize {
                    break;
                }
            }

            let proc_group = format!("{}/{}", queue.name, item.dag_name);
            match self.proc_store.acquire(&proc_group, item.run_id, "scheduler", 15) {
                Ok(_) => {}
                Err(StorageError::Conflict(_)) => continue,
                Err(err) => return Err(err),
            }

            self.dagrun_store.create_attempt(&item.dag_name, item.run_id, item.params.clone())?;
            launcher.launch(&item.dag_name, item.run_id, item.params.clone()).await;
            self.queue_store.delete(&queue.name, &item.dag_name, item.run_id)?;
            running += 1;
            debug!(dag = %item.dag_name, run_id = %item.run_id, "admitted run");
        }
        Ok(())
    }

    fn running_count(&self, queue: &Queue) -> Result<usize, StorageError> {
        match queue.kind {
            QueueKind::Global { .. } => {
                // A global queue spans every DAG that uses it; count across
                // all DAGs currently drawing from this queue name.
                let mut total = 0;
                for dag in self.dags_in_queue(&queue.name)? {
                    total += self.dagrun_store.running_count(&dag)?;
                }
                Ok(total)
            }
            QueueKind::PerDag { .. } => {
                // One queue per DAG: `queue.name` doubles as the DAG name.
                self.dagrun_store.running_count(&queue.name)
            }
        }
    }

    fn dags_in_queue(&self, queue_name: &str) -> Result<Vec<String>, StorageError> {
        let items = self.queue_store.list(queue_name)?;
        let mut dags: Vec<String> = items.into_iter().map(|i| i.dag_name).collect();
        dags.sort();
        dags.dedup();
        Ok(dags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use railtrack_core::{FakeClock, QueueItem, RunId};
    use tempfile::tempdir;

    struct RecordingLauncher {
        launched: Mutex<Vec<RunId>>,
    }

    #[async_trait::async_trait]
    impl RunLauncher for RecordingLauncher {
        async fn launch(&self, _dag_name: &str, run_id: RunId, _params: Vec<(String, String)>) {
            self.launched.lock().push(run_id);
        }
    }

    fn item(dag: &str, enqueued_at_ms: u64) -> QueueItem {
        QueueItem {
            queue_name: "shared".to_string(),
            dag_name: dag.to_string(),
            run_id: RunId::new(),
            params: Vec::new(),
            enqueued_at_ms,
        }
    }

    #[tokio::test]
    async fn tick_admits_up_to_max_concurrency_then_stops() {
        let dir = tempdir().expect("tempdir");
        let queue_store = Arc::new(QueueStore::new(dir.path()));
        let dagrun_store = Arc::new(DagRunStore::new(dir.path()));
        let proc_store = Arc::new(ProcStore::new(dir.path(), FakeClock::new()));

        let a = item("build", 1);
        let b = item("deploy", 2);
        let c = item("test", 3);
        queue_store.enqueue(&a).expect("enqueue a");
        queue_store.enqueue(&b).expect("enqueue b");
        queue_store.enqueue(&c).expect("enqueue c");

        let queues = vec![Queue { name: "shared".to_string(), kind: QueueKind::Global { max_concurrency: 2 } }];
        let scheduler = Scheduler::new(queue_store.clone(), dagrun_store, proc_store, queues, 32, Duration::from_millis(1));

        let launcher = Arc::new(RecordingLauncher { launched: Mutex::new(Vec::new()) });
        scheduler.tick(launcher.as_ref()).await.expect("tick");

        assert_eq!(launcher.launched.lock().len(), 2);
        assert_eq!(queue_store.list("shared").expect("list").len(), 1);
    }
}
