// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binds the Scheduler's admitted queue items to a real Agent (C7), and
//! gives that Agent a way to hand worker-selector steps off through this
//! same Coordinator's Task Dispatcher (§4.6 "distributed mode").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use railtrack_agent::{Agent, AgentConfig, AgentError, DagResolver, StepDispatcher};
use railtrack_core::{Clock, DagSpec, Operation, RunId, Task, TaskId, TaskOutcome};
use railtrack_storage::DagRunStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::dispatcher::TaskDispatcher;
use crate::scheduler::RunLauncher;

/// Resolves a DAG spec by reading `<dag_dir>/<name>.yaml` (§1: DAG spec
/// loading is a thin convenience the embedding binary supplies).
pub struct FsDagResolver {
    dir: PathBuf,
}

impl FsDagResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, dag_name: &str) -> PathBuf {
        self.dir.join(format!("{dag_name}.yaml"))
    }
}

impl DagResolver for FsDagResolver {
    fn resolve(&self, dag_name: &str) -> Option<DagSpec> {
        let text = std::fs::read_to_string(self.path_for(dag_name)).ok()?;
        match DagSpec::from_yaml(&text) {
            Ok(spec) => Some(spec),
            Err(err) => {
                error!(dag = %dag_name, error = %err, "failed to parse dag spec file");
                None
            }
        }
    }
}

/// Hands a single step off to the Coordinator's own Dispatcher as a
/// synthetic one-step Task, and waits for a worker to report its outcome
/// on the normal status-push channel (§4.8), keyed by a per-step run id.
pub struct InProcessStepDispatcher<C: Clock> {
    dispatcher: Arc<TaskDispatcher<C>>,
}

impl<C: Clock> InProcessStepDispatcher<C> {
    pub fn new(dispatcher: Arc<TaskDispatcher<C>>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl<C: Clock> StepDispatcher for InProcessStepDispatcher<C> {
    async fn dispatch_step(
        &self,
        run_id: RunId,
        step_name: &str,
        command: &str,
        worker_selector: HashMap<String, String>,
        dispatch_timeout: Duration,
    ) -> Result<TaskOutcome, AgentError> {
        let step_run_id = RunId::new();
        let dag_spec = single_step_spec(step_name, command);
        let task = Task {
            task_id: TaskId::new(),
            dag_spec,
            run_id: step_run_id,
            parent_run_id: Some(run_id),
            root_run_id: Some(run_id),
            params: Vec::new(),
            worker_selector,
            target_step: Some(step_name.to_string()),
            operation: Operation::Start,
        };
        self.dispatcher.submit(task);

        match self.dispatcher.await_outcome(step_run_id, dispatch_timeout).await {
            Some(outcome) => Ok(outcome),
            None => Err(AgentError::NoMatchingWorker(step_name.to_string())),
        }
    }
}

fn single_step_spec(step_name: &str, command: &str) -> String {
    format!("name: {step_name}\nsteps:\n  - name: {step_name}\n    command: {command:?}\n")
}

/// Spawns a real Agent per admitted run, fire-and-forget per §4.6's
/// pseudocode (`spawn Agent(item) // tokio::spawn`).
pub struct AgentRunLauncher<C: Clock> {
    dagrun_store: Arc<DagRunStore>,
    resolver: Arc<dyn DagResolver>,
    dispatcher: Arc<dyn StepDispatcher>,
    clock: C,
    config: AgentConfig,
}

impl<C: Clock> AgentRunLauncher<C> {
    pub fn new(
        dagrun_store: Arc<DagRunStore>,
        dag_dir: impl AsRef<Path>,
        dispatcher: Arc<TaskDispatcher<C>>,
        clock: C,
        config: AgentConfig,
    ) -> Self {
        Self {
            dagrun_store,
            resolver: Arc::new(FsDagResolver::new(dag_dir.as_ref())),
            dispatcher: Arc::new(InProcessStepDispatcher::new(dispatcher)),
            clock,
            config,
        }
    }
}

#[async_trait]
impl<C: Clock> RunLauncher for AgentRunLauncher<C> {
    async fn launch(&self, dag_name: &str, run_id: RunId, params: Vec<(String, String)>) {
        let Some(spec) = self.resolver.resolve(dag_name) else {
            error!(dag = %dag_name, run_id = %run_id, "no dag spec found for admitted run");
            return;
        };
        let dag_name = dag_name.to_string();

        let agent = Agent::new(
            self.dagrun_store.clone(),
            self.resolver.clone(),
            Some(self.dispatcher.clone()),
            self.clock.clone(),
            AgentConfig { dispatch_timeout: self.config.dispatch_timeout, shutdown_grace: self.config.shutdown_grace },
        );
        tokio::spawn(async move {
            if let Err(err) =
                agent.run(&spec, run_id, params, None, None, Operation::Start, CancellationToken::new()).await
            {
                warn!(dag = %dag_name, run_id = %run_id, error = %err, "agent run failed");
            }
        });
    }
}
