// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("wire protocol error: {0}")]
    Protocol(#[from] railtrack_wire::ProtocolError),

    #[error("unexpected response from coordinator: {0}")]
    UnexpectedResponse(String),

    #[error("invalid dag spec for task: {0}")]
    InvalidDagSpec(#[from] serde_yaml::Error),
}
