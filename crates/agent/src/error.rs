// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid graph: {0}")]
    InvalidGraph(#[from] railtrack_core::CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] railtrack_storage::StorageError),

    #[error("no worker matched selector for step {0:?} within dispatch timeout")]
    NoMatchingWorker(String),
}
