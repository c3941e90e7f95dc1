// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-backed DAG-Run Store (§4.4).
//!
//! Layout: `runs/<dag_name>/<run_id>/attempt.json` for the status snapshot,
//! `logs/<dag_name>/<run_id>/<step_name>.{stdout,stderr}` for step output.
//! Every write goes through [`crate::atomic::write_atomic`] so readers never
//! observe a torn snapshot.

use std::fs;
use std::path::PathBuf;

use parking_lot::RwLock;
use railtrack_core::{DagRun, DagRunStatus, RunId};
use std::collections::HashMap;

use crate::atomic::{read_json, write_atomic};
use crate::error::StorageError;

/// A handle identifying one run's attempt within the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DagRunHandle {
    pub run_id: RunId,
}

#[derive(Debug, Default, Clone)]
pub struct DagRunFilter {
    pub dag_name: Option<String>,
    pub status: Option<DagRunStatus>,
}

impl DagRunFilter {
    fn matches(&self, run: &DagRun) -> bool {
        if let Some(dag_name) = &self.dag_name {
            if &run.dag_name != dag_name {
                return false;
            }
        }
        if let Some(status) = self.status {
            if run.status != status {
                return false;
            }
        }
        true
    }
}

/// In-memory ownership index (`parent_run_id → [child_run_id]`), rebuilt
/// from the store on load rather than persisted directly — "a directed
/// ownership graph, not a tree of process handles" (§4.9).
#[derive(Default)]
struct OwnershipIndex {
    children: HashMap<RunId, Vec<RunId>>,
}

pub struct DagRunStore {
    root: PathBuf,
    ownership: RwLock<OwnershipIndex>,
}

impl DagRunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), ownership: RwLock::new(OwnershipIndex::default()) }
    }

    fn attempt_path(&self, dag_name: &str, run_id: RunId) -> PathBuf {
        self.root.join("runs").join(dag_name).join(run_id.as_str()).join("attempt.json")
    }

    pub fn log_path(&self, dag_name: &str, run_id: RunId, step_name: &str, ext: &str) -> PathBuf {
        self.root
            .join("logs")
            .join(dag_name)
            .join(run_id.as_str())
            .join(format!("{step_name}.{ext}"))
    }

    pub fn create_attempt(
        &self,
        dag_name: &str,
        run_id: RunId,
        params: Vec<(String, String)>,
    ) -> Result<DagRunHandle, StorageError> {
        let path = self.attempt_path(dag_name, run_id);
        if !path.exists() {
            let run = DagRun::new(dag_name, run_id, params);
            write_atomic(&path, &run)?;
        }
        Ok(DagRunHandle { run_id })
    }

    /// Whole-attempt write — never a partial patch, so a reader always sees
    /// a consistent view (§4.4).
    pub fn write_status(&self, handle: DagRunHandle, snapshot: &DagRun) -> Result<(), StorageError> {
        let path = self.attempt_path(&snapshot.dag_name, handle.run_id);
        write_atomic(&path, snapshot)?;

        if let Some(parent) = snapshot.parent_run_id {
            let mut index = self.ownership.write();
            let children = index.children.entry(parent).or_default();
            if !children.contains(&snapshot.run_id) {
                children.push(snapshot.run_id);
            }
        }
        Ok(())
    }

    pub fn read_status(&self, dag_name: &str, run_id: RunId) -> Result<DagRun, StorageError> {
        let path = self.attempt_path(dag_name, run_id);
        read_json(&path).map_err(|_| StorageError::NotFound(format!("run {run_id}")))
    }

    pub fn latest(&self, dag_name: &str) -> Result<Option<DagRun>, StorageError> {
        let mut runs = self.list_statuses(&DagRunFilter { dag_name: Some(dag_name.to_string()), status: None })?;
        runs.sort_by_key(|r| r.started_at_ms.unwrap_or(0));
        Ok(runs.pop())
    }

    pub fn list_statuses(&self, filter: &DagRunFilter) -> Result<Vec<DagRun>, StorageError> {
        let runs_dir = self.root.join("runs");
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for dag_entry in fs::read_dir(&runs_dir)? {
            let dag_entry = dag_entry?;
            if !dag_entry.file_type()?.is_dir() {
                continue;
            }
            for run_entry in fs::read_dir(dag_entry.path())? {
                let run_entry = run_entry?;
                let attempt = run_entry.path().join("attempt.json");
                if !attempt.exists() {
                    continue;
                }
                let run: DagRun = read_json(&attempt)?;
                if filter.matches(&run) {
                    out.push(run);
                }
            }
        }
        Ok(out)
    }

    /// Children of `run_id`, recursively, per the ownership index (§4.9).
    pub fn descendants(&self, run_id: RunId) -> Vec<RunId> {
        let index = self.ownership.read();
        let mut stack = vec![run_id];
        let mut out = Vec::new();
        while let Some(current) = stack.pop() {
            if let Some(children) = index.children.get(&current) {
                for child in children {
                    out.push(*child);
                    stack.push(*child);
                }
            }
        }
        out
    }

    /// Running-run count for `dag_name`, used by the Scheduler to enforce
    /// `max_concurrency` (§4.6).
    pub fn running_count(&self, dag_name: &str) -> Result<usize, StorageError> {
        let filter = DagRunFilter { dag_name: Some(dag_name.to_string()), status: None };
        let count = self
            .list_statuses(&filter)?
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .count();
        Ok(count)
    }
}
