// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the data model crate (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid dag spec: {0}")]
    InvalidDagSpec(String),

    #[error("cycle detected in dag spec, involving step {0:?}")]
    CyclicGraph(String),

    #[error("unknown step {0:?} referenced by dependency")]
    UnknownStep(String),

    #[error("id {0:?} exceeds maximum length")]
    IdTooLong(String),
}
