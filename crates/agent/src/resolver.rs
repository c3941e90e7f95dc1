// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves a named child DAG for `call:` steps and sub-dag fan-out (§4.9).
//! Loading/validating DAG spec files from disk is outside this crate's
//! scope (§1) — the embedding binary supplies an implementation.

use railtrack_core::DagSpec;

pub trait DagResolver: Send + Sync {
    fn resolve(&self, dag_name: &str) -> Option<DagSpec>;
}

/// An in-memory resolver, useful for tests and for a coordinator that has
/// preloaded every DAG spec at startup.
pub struct StaticDagResolver {
    specs: std::collections::HashMap<String, DagSpec>,
}

impl StaticDagResolver {
    pub fn new(specs: impl IntoIterator<Item = DagSpec>) -> Self {
        Self { specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect() }
    }
}

impl DagResolver for StaticDagResolver {
    fn resolve(&self, dag_name: &str) -> Option<DagSpec> {
        self.specs.get(dag_name).cloned()
    }
}
