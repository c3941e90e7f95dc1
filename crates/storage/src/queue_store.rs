// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-backed Queue Store (§4.3).
//!
//! Layout: `queue/<queue_name>/<dag_name>/<timestamp>-<run_id>.json`. Items
//! are sorted by filename for FIFO, which is why the timestamp is
//! zero-padded and leads the run-id in the filename.

use std::fs;
use std::path::{Path, PathBuf};

use railtrack_core::{QueueItem, RunId};

use crate::atomic::{read_json, write_atomic};
use crate::error::StorageError;

pub struct QueueStore {
    root: PathBuf,
}

impl QueueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dag_dir(&self, queue: &str, dag: &str) -> PathBuf {
        self.root.join("queue").join(queue).join(dag)
    }

    fn item_path(&self, item: &QueueItem) -> PathBuf {
        self.dag_dir(&item.queue_name, &item.dag_name)
            .join(format!("{:020}-{}.json", item.enqueued_at_ms, item.run_id.as_str()))
    }

    /// Idempotent on `(queue, dag, run_id)`: re-enqueuing the same key is a
    /// no-op rather than a duplicate file.
    pub fn enqueue(&self, item: &QueueItem) -> Result<(), StorageError> {
        if self.find_path(&item.queue_name, &item.dag_name, item.run_id)?.is_some() {
            return Ok(());
        }
        write_atomic(&self.item_path(item), item)
    }

    /// Remove and return the head item for a given DAG within a queue.
    pub fn dequeue(&self, queue: &str, dag: &str) -> Result<Option<QueueItem>, StorageError> {
        let mut items = self.list_by_dag(queue, dag)?;
        if items.is_empty() {
            return Ok(None);
        }
        let head = items.remove(0);
        self.delete(queue, dag, head.run_id)?;
        Ok(Some(head))
    }

    pub fn list(&self, queue: &str) -> Result<Vec<QueueItem>, StorageError> {
        let queue_dir = self.root.join("queue").join(queue);
        if !queue_dir.exists() {
            return Ok(Vec::new());
        }
        let mut dags: Vec<String> = Vec::new();
        for entry in fs::read_dir(&queue_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    dags.push(name.to_string());
                }
            }
        }
        dags.sort();
        let mut items = Vec::new();
        for dag in dags {
            items.extend(self.list_by_dag(queue, &dag)?);
        }
        Ok(items)
    }

    pub fn list_by_dag(&self, queue: &str, dag: &str) -> Result<Vec<QueueItem>, StorageError> {
        let dir = self.dag_dir(queue, dag);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut file_names: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        file_names.sort();

        let mut items = Vec::with_capacity(file_names.len());
        for path in file_names {
            items.push(read_json(&path)?);
        }
        Ok(items)
    }

    pub fn delete(&self, queue: &str, dag: &str, run_id: RunId) -> Result<(), StorageError> {
        if let Some(path) = self.find_path(queue, dag, run_id)? {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn find_path(&self, queue: &str, dag: &str, run_id: RunId) -> Result<Option<PathBuf>, StorageError> {
        let dir = self.dag_dir(queue, dag);
        if !dir.exists() {
            return Ok(None);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let item: QueueItem = read_json(&path)?;
                if item.run_id == run_id {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railtrack_core::RunId;
    use tempfile::tempdir;

    fn item(dag: &str, run_id: RunId, enqueued_at_ms: u64) -> QueueItem {
        QueueItem {
            queue_name: "default".to_string(),
            dag_name: dag.to_string(),
            run_id,
            params: Vec::new(),
            enqueued_at_ms,
        }
    }

    #[test]
    fn enqueue_then_list_by_dag_preserves_fifo_order() {
        let dir = tempdir().expect("tempdir");
        let store = QueueStore::new(dir.path());
        let a = item("build", RunId::new(), 1);
        let b = item("build", RunId::new(), 2);
        store.enqueue(&b).expect("enqueue b");
        store.enqueue(&a).expect("enqueue a");

        let items = store.list_by_dag("default", "build").expect("list");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].run_id, a.run_id);
        assert_eq!(items[1].run_id, b.run_id);
    }

    #[test]
    fn enqueue_is_idempotent_on_queue_dag_run_id() {
        let dir = tempdir().expect("tempdir");
        let store = QueueStore::new(dir.path());
        let a = item("build", RunId::from_string("run-aaaaaaaaaaaaaaaaaaa"), 1);
        store.enqueue(&a).expect("enqueue");
        store.enqueue(&a).expect("enqueue again");
        assert_eq!(store.list_by_dag("default", "build").expect("list").len(), 1);
    }

    #[test]
    fn dequeue_removes_head_and_persists_across_store_instances() {
        let dir = tempdir().expect("tempdir");
        let store = QueueStore::new(dir.path());
        let a = item("build", RunId::new(), 1);
        store.enqueue(&a).expect("enqueue");

        let reopened = QueueStore::new(dir.path());
        let head = reopened.dequeue("default", "build").expect("dequeue").expect("item present");
        assert_eq!(head.run_id, a.run_id);
        assert!(reopened.list_by_dag("default", "build").expect("list").is_empty());
    }
}
