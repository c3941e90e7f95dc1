// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-backed Proc Store (§4.5).
//!
//! Layout: `proc/<proc_group>/<run_id>.json`. Persisted (not purely
//! in-memory) so a Coordinator restart doesn't let a still-running Agent
//! collide with a freshly spawned one before the lease naturally expires.

use std::fs;
use std::path::PathBuf;

use railtrack_core::{Clock, ProcToken, ProcTokenId, RunId};

use crate::atomic::{read_json, write_atomic};
use crate::error::StorageError;

pub struct ProcStore<C: Clock> {
    root: PathBuf,
    clock: C,
}

impl<C: Clock> ProcStore<C> {
    pub fn new(root: impl Into<PathBuf>, clock: C) -> Self {
        Self { root: root.into(), clock }
    }

    fn token_path(&self, proc_group: &str, run_id: RunId) -> PathBuf {
        self.root.join("proc").join(proc_group).join(format!("{}.json", run_id.as_str()))
    }

    /// Acquire a lease for `(proc_group, run_id)`. Returns `Conflict` if a
    /// non-expired token already exists for that key.
    pub fn acquire(
        &self,
        proc_group: &str,
        run_id: RunId,
        holder: impl Into<String>,
        lease_seconds: u64,
    ) -> Result<ProcToken, StorageError> {
        let path = self.token_path(proc_group, run_id);
        let now = self.clock.epoch_ms();

        if path.exists() {
            let existing: ProcToken = read_json(&path)?;
            if !existing.is_expired(now) {
                return Err(StorageError::Conflict(format!(
                    "proc token already held for run {run_id}"
                )));
            }
        }

        let token = ProcToken {
            token_id: ProcTokenId::new(),
            run_id,
            holder: holder.into(),
            acquired_at_ms: now,
            expires_at_ms: now + lease_seconds * 1000,
        };
        write_atomic(&path, &token)?;
        Ok(token)
    }

    /// Refresh an existing lease, extending its `expires_at`. Fails if the
    /// token has already expired or been released.
    pub fn refresh(
        &self,
        proc_group: &str,
        token: &ProcToken,
        lease_seconds: u64,
    ) -> Result<ProcToken, StorageError> {
        let path = self.token_path(proc_group, token.run_id);
        let now = self.clock.epoch_ms();
        let existing: ProcToken =
            read_json(&path).map_err(|_| StorageError::NotFound(format!("proc token {}", token.token_id)))?;

        if !existing.can_renew(&token.holder, now) {
            return Err(StorageError::Conflict(format!(
                "proc token for run {} can no longer be renewed by {}",
                token.run_id, token.holder
            )));
        }

        let renewed = ProcToken { expires_at_ms: now + lease_seconds * 1000, ..existing };
        write_atomic(&path, &renewed)?;
        Ok(renewed)
    }

    pub fn release(&self, proc_group: &str, run_id: RunId) -> Result<(), StorageError> {
        let path = self.token_path(proc_group, run_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railtrack_core::FakeClock;
    use tempfile::tempdir;

    #[test]
    fn acquire_conflicts_while_lease_is_live() {
        let dir = tempdir().expect("tempdir");
        let clock = FakeClock::new();
        let store = ProcStore::new(dir.path(), clock);
        let run_id = RunId::new();
        store.acquire("agents", run_id, "agent-1", 15).expect("first acquire");

        let err = store.acquire("agents", run_id, "agent-2", 15).expect_err("should conflict");
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[test]
    fn acquire_succeeds_again_after_lease_expires() {
        let dir = tempdir().expect("tempdir");
        let clock = FakeClock::new();
        let store = ProcStore::new(dir.path(), clock.clone());
        let run_id = RunId::new();
        store.acquire("agents", run_id, "agent-1", 15).expect("first acquire");

        clock.advance(std::time::Duration::from_secs(16));
        store.acquire("agents", run_id, "agent-2", 15).expect("acquire after expiry");
    }

    #[test]
    fn release_then_acquire_succeeds_immediately() {
        let dir = tempdir().expect("tempdir");
        let clock = FakeClock::new();
        let store = ProcStore::new(dir.path(), clock);
        let run_id = RunId::new();
        let token = store.acquire("agents", run_id, "agent-1", 15).expect("acquire");
        store.release("agents", token.run_id).expect("release");
        store.acquire("agents", run_id, "agent-2", 15).expect("re-acquire");
    }

    #[test]
    fn refresh_rejects_wrong_holder() {
        let dir = tempdir().expect("tempdir");
        let clock = FakeClock::new();
        let store = ProcStore::new(dir.path(), clock);
        let run_id = RunId::new();
        let token = store.acquire("agents", run_id, "agent-1", 15).expect("acquire");

        let mut impostor = token.clone();
        impostor.holder = "agent-2".to_string();
        let err = store.refresh("agents", &impostor, 15).expect_err("should reject");
        assert!(matches!(err, StorageError::Conflict(_)));
    }
}
