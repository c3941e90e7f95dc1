// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-backed persistence for the Queue Store (C3), DAG-Run Store
//! (C4), and Proc Store (C5) (§4.3–§4.5).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod atomic;
mod dagrun_store;
mod error;
mod proc_store;
mod queue_store;

pub use dagrun_store::{DagRunFilter, DagRunHandle, DagRunStore};
pub use error::StorageError;
pub use proc_store::ProcStore;
pub use queue_store::QueueStore;
