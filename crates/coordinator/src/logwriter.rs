// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log stream sink (§4.8): appends stdout/stderr chunks pushed by workers to
//! per-step files, deduplicating by offset so an at-least-once resend never
//! double-applies a chunk.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use parking_lot::Mutex;
use railtrack_core::{LogChunk, LogStream, RunId};
use railtrack_storage::DagRunStore;

#[derive(Default)]
pub struct LogWriter {
    /// `run_id` -> owning dag name, learned from status snapshots so a log
    /// chunk (which carries no `dag_name`) can be placed on disk (§6).
    dag_names: Mutex<HashMap<RunId, String>>,
    /// High-water mark per `(run_id, step_name, stream)`, used to drop
    /// chunks that fall entirely behind what's already been written.
    applied_up_to: Mutex<HashMap<(RunId, String, LogStream), u64>>,
}

impl LogWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_dag_name(&self, run_id: RunId, dag_name: &str) {
        self.dag_names.lock().entry(run_id).or_insert_with(|| dag_name.to_string());
    }

    /// Append `chunk` to its step's log file unless it's a duplicate of
    /// already-applied bytes. Returns `false` (and logs) if the run's
    /// `dag_name` hasn't been observed yet via a prior status snapshot.
    pub fn write_chunk(&self, dagrun_store: &DagRunStore, chunk: &LogChunk) -> bool {
        let Some(dag_name) = self.dag_names.lock().get(&chunk.run_id).cloned() else {
            return false;
        };

        let key = (chunk.run_id, chunk.step_name.clone(), chunk.stream);
        let mut marks = self.applied_up_to.lock();
        let high_water = marks.get(&key).copied().unwrap_or(0);
        if chunk.is_duplicate(high_water) {
            return true;
        }

        let ext = match chunk.stream {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        };
        let path: PathBuf = dagrun_store.log_path(&dag_name, chunk.run_id, &chunk.step_name, ext);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let result = OpenOptions::new().create(true).write(true).open(&path).and_then(|mut file| {
            file.seek(SeekFrom::Start(chunk.offset))?;
            file.write_all(&chunk.data)
        });
        if result.is_ok() {
            marks.insert(key, chunk.end_offset().max(high_water));
        }
        result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railtrack_core::RunId;
    use tempfile::tempdir;

    fn chunk(run_id: RunId, offset: u64, data: &[u8]) -> LogChunk {
        LogChunk { run_id, step_name: "build".to_string(), stream: LogStream::Stdout, offset, data: data.to_vec() }
    }

    #[test]
    fn duplicate_chunk_is_accepted_without_rewriting() {
        let dir = tempdir().expect("tempdir");
        let store = DagRunStore::new(dir.path());
        let writer = LogWriter::new();
        let run_id = RunId::new();
        writer.note_dag_name(run_id, "build-dag");

        assert!(writer.write_chunk(&store, &chunk(run_id, 0, b"hello ")));
        assert!(writer.write_chunk(&store, &chunk(run_id, 6, b"world")));
        // Resend of the first chunk: fully behind the high-water mark.
        assert!(writer.write_chunk(&store, &chunk(run_id, 0, b"hello ")));

        let path = store.log_path("build-dag", run_id, "build", "stdout");
        let contents = std::fs::read_to_string(path).expect("read log");
        assert_eq!(contents, "hello world");
    }

    #[test]
    fn chunk_for_unknown_run_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = DagRunStore::new(dir.path());
        let writer = LogWriter::new();
        assert!(!writer.write_chunk(&store, &chunk(RunId::new(), 0, b"x")));
    }
}
