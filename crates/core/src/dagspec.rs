// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DagSpec: the ambient, serde-based DAG definition the Agent loads and
//! validates before execution (SPEC_FULL §3 "DagSpec (ambient...)", §4.6).
//!
//! This is a thin convenience layer, not a validating parser: semantic
//! checks (cycle detection, unknown dependency names) happen in the Agent's
//! graph construction step, not here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default dispatch timeout applied to a task waiting for a matching worker
/// to claim it, when the DAG spec doesn't override it (§6).
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub interval_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelSpec {
    /// Name of a variable holding a list of items to fan out over.
    pub items: String,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    #[serde(default, alias = "depends")]
    pub depends: Vec<String>,
    #[serde(default)]
    pub command: Option<String>,
    /// Name of another DAG to invoke as a sub-run, for `call:` steps.
    #[serde(default)]
    pub call: Option<String>,
    #[serde(default)]
    pub parallel: Option<ParallelSpec>,
    #[serde(default, alias = "retry_policy")]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default)]
    pub worker_selector: HashMap<String, String>,
    /// Name of the output variable captured from the step's final
    /// `NAME=value` stdout line (§4.7 step 2).
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerSpec {
    #[serde(default)]
    pub on_success: Option<String>,
    #[serde(default)]
    pub on_failure: Option<String>,
    #[serde(default)]
    pub on_cancel: Option<String>,
    /// Always runs last, regardless of run outcome (§4.7, §9 Open Question 2).
    #[serde(default)]
    pub on_exit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagSpec {
    pub name: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub max_active_runs: Option<u32>,
    #[serde(default)]
    pub worker_selector: HashMap<String, String>,
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_sec: u64,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub handlers: HandlerSpec,
}

fn default_dispatch_timeout() -> u64 {
    DEFAULT_DISPATCH_TIMEOUT_SECS
}

impl DagSpec {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name == name)
    }
}
