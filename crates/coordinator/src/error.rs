// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("storage error: {0}")]
    Storage(#[from] railtrack_storage::StorageError),

    #[error("protocol error: {0}")]
    Protocol(#[from] railtrack_wire::ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),
}
