// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run state machine (C7, §4.7): graph construction, the ready-set
//! execution loop, retry, cancellation, and lifecycle hooks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use railtrack_core::{
    Clock, DagRun, DagRunStatus, DagSpec, NodeState, NodeStatus, Operation, ParallelSpec, RunError,
    RunErrorKind, RunId, StepSpec, SubRunRef,
};
use railtrack_storage::DagRunStore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatch::StepDispatcher;
use crate::error::AgentError;
use crate::executor;
use crate::graph::Graph;
use crate::resolver::DagResolver;

pub struct AgentConfig {
    pub dispatch_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { dispatch_timeout: Duration::from_secs(5), shutdown_grace: Duration::from_secs(30) }
    }
}

pub struct Agent<C: Clock> {
    dagrun_store: Arc<DagRunStore>,
    resolver: Arc<dyn DagResolver>,
    dispatcher: Option<Arc<dyn StepDispatcher>>,
    clock: C,
    config: AgentConfig,
}

struct NodeOutcome {
    step_name: String,
    status: NodeStatus,
    output_variables: HashMap<String, String>,
    sub_runs: Vec<SubRunRef>,
    error: Option<String>,
}

impl<C: Clock> Agent<C> {
    pub fn new(
        dagrun_store: Arc<DagRunStore>,
        resolver: Arc<dyn DagResolver>,
        dispatcher: Option<Arc<dyn StepDispatcher>>,
        clock: C,
        config: AgentConfig,
    ) -> Self {
        Self { dagrun_store, resolver, dispatcher, clock, config }
    }

    /// Drive one run to a terminal status (§4.7 steps 1-5).
    pub async fn run(
        &self,
        spec: &DagSpec,
        run_id: RunId,
        params: Vec<(String, String)>,
        parent_run_id: Option<RunId>,
        root_run_id: Option<RunId>,
        operation: Operation,
        cancel: CancellationToken,
    ) -> Result<DagRun, AgentError> {
        let graph = match Graph::build(&spec.steps) {
            Ok(graph) => graph,
            Err(err) => {
                let mut run = DagRun::new(spec.name.clone(), run_id, params.clone());
                run.parent_run_id = parent_run_id;
                run.root_run_id = root_run_id;
                run.status = DagRunStatus::Failed;
                run.error = Some(RunError {
                    kind: RunErrorKind::InvalidGraph,
                    message: err.to_string(),
                    step: None,
                });
                self.persist(&run)?;
                return Ok(run);
            }
        };

        let handle = self.dagrun_store.create_attempt(&spec.name, run_id, params.clone())?;
        let mut run = self.dagrun_store.read_status(&spec.name, run_id)?;
        run.parent_run_id = parent_run_id;
        run.root_run_id = Some(root_run_id.unwrap_or(run_id));
        run.status = DagRunStatus::Running;
        if run.started_at_ms.is_none() {
            run.started_at_ms = Some(self.clock.epoch_ms());
        }

        for name in graph.step_names() {
            if run.node(name).is_none() {
                run.nodes.push(NodeState::pending(name.to_string()));
            }
        }

        if operation == Operation::Retry {
            for node in run.nodes.iter_mut() {
                if matches!(node.status, NodeStatus::Failed | NodeStatus::Aborted) {
                    node.status = NodeStatus::NotStarted;
                    node.finished_at_ms = None;
                    node.error = None;
                }
            }
        }

        self.dagrun_store.write_status(handle, &run)?;

        let mut in_flight: JoinSet<NodeOutcome> = JoinSet::new();
        let mut running_names: std::collections::HashSet<String> = std::collections::HashSet::new();

        loop {
            if cancel.is_cancelled() {
                self.abort_running(&mut run, &running_names);
                self.persist(&run)?;
                break;
            }

            let ready = self.ready_nodes(&graph, &run, &running_names);
            for step_name in ready {
                let Some(step) = graph.step(&step_name) else {
                    warn!(step = %step_name, "ready node missing from graph, skipping");
                    continue;
                };
                let step = step.clone();
                if let Some(node) = run.node_mut(&step_name) {
                    node.status = NodeStatus::Running;
                    node.started_at_ms = Some(self.clock.epoch_ms());
                }
                running_names.insert(step_name.clone());
                self.spawn_node(&mut in_flight, spec, run_id, &step, cancel.clone());
            }
            self.persist(&run)?;

            if running_names.is_empty() {
                break;
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    self.abort_running(&mut run, &running_names);
                    self.persist(&run)?;
                    break;
                }
                joined = in_flight.join_next() => {
                    match joined {
                        Some(Ok(outcome)) => outcome,
                        Some(Err(err)) => {
                            warn!(error = %err, "node task panicked");
                            continue;
                        }
                        None => break,
                    }
                }
            };

            running_names.remove(&outcome.step_name);
            if let Some(node) = run.node_mut(&outcome.step_name) {
                node.status = outcome.status;
                node.finished_at_ms = Some(self.clock.epoch_ms());
                node.output_variables = outcome.output_variables;
                node.sub_runs = outcome.sub_runs;
                node.error = outcome.error;
            }
            self.persist(&run)?;
        }

        if let Some(status) = run.compute_terminal_status() {
            run.status = status;
            run.finished_at_ms = Some(self.clock.epoch_ms());
            if run.status == DagRunStatus::Failed || run.status == DagRunStatus::PartialSuccess {
                let failed_step = run.nodes.iter().find(|n| n.status == NodeStatus::Failed);
                run.error = failed_step.map(|n| {
                    let kind = match n.error.as_deref() {
                        Some("no_matching_workers") => RunErrorKind::NoMatchingWorker,
                        Some("worker_lost") => RunErrorKind::WorkerLost,
                        _ => RunErrorKind::NodeFailed,
                    };
                    RunError { kind, message: n.error.clone().unwrap_or_else(|| "step failed".to_string()), step: Some(n.step_name.clone()) }
                });
            }
        }
        if cancel.is_cancelled() {
            run.status = DagRunStatus::Aborted;
            run.error = Some(RunError {
                kind: RunErrorKind::Cancelled,
                message: "run cancelled".to_string(),
                step: None,
            });
        }
        self.persist(&run)?;

        self.run_handlers(spec, &mut run, cancel.clone()).await;
        self.persist(&run)?;

        Ok(run)
    }

    /// Nodes whose preconditions hold: every dependency `Succeeded`, or the
    /// node declares `continue_on_failure` and every dependency is terminal
    /// (§4.7 step 1).
    fn ready_nodes(&self, graph: &Graph, run: &DagRun, running: &std::collections::HashSet<String>) -> Vec<String> {
        let mut ready = Vec::new();
        for name in graph.step_names() {
            if running.contains(name) {
                continue;
            }
            let Some(node) = run.node(name) else { continue };
            if node.status != NodeStatus::NotStarted {
                continue;
            }
            let Some(step) = graph.step(name) else { continue };
            let deps_ok = step.depends.iter().all(|dep| {
                run.node(dep).map(|d| {
                    if step.continue_on_failure {
                        d.status.is_terminal()
                    } else {
                        d.status.satisfies_dependency()
                    }
                }).unwrap_or(false)
            });
            if deps_ok {
                ready.push(name.to_string());
            }
        }
        ready
    }

    fn abort_running(&self, run: &mut DagRun, running: &std::collections::HashSet<String>) {
        for name in running {
            if let Some(node) = run.node_mut(name) {
                node.status = NodeStatus::Aborted;
                node.finished_at_ms = Some(self.clock.epoch_ms());
                node.error = Some("cancelled".to_string());
            }
        }
    }

    fn persist(&self, run: &DagRun) -> Result<(), AgentError> {
        let handle = railtrack_storage::DagRunHandle { run_id: run.run_id };
        self.dagrun_store.write_status(handle, run)?;
        Ok(())
    }

    fn spawn_node(
        &self,
        in_flight: &mut JoinSet<NodeOutcome>,
        spec: &DagSpec,
        run_id: RunId,
        step: &StepSpec,
        cancel: CancellationToken,
    ) {
        let dagrun_store = self.dagrun_store.clone();
        let resolver = self.resolver.clone();
        let dispatcher = self.dispatcher.clone();
        let dag_name = spec.name.clone();
        let step = step.clone();
        let shutdown_grace = self.config.shutdown_grace;
        let dispatch_timeout = self.config.dispatch_timeout;

        in_flight.spawn(async move {
            let step_name = step.name.clone();
            if let Some(parallel) = step.parallel.clone() {
                run_parallel_node(&step, &parallel, &resolver, dagrun_store, dag_name, run_id, cancel).await
            } else if let Some(child_dag) = step.call.clone() {
                run_subdag_node(&step, &child_dag, &resolver, dagrun_store, dag_name, run_id, cancel).await
            } else if !step.worker_selector.is_empty() {
                run_remote_node(&step, dispatcher, run_id, dispatch_timeout).await
            } else {
                run_local_node(&step, shutdown_grace, cancel).await
            }
            .unwrap_or_else(|outcome| outcome)
            .tap_name(step_name)
        });
    }

    async fn run_handlers(&self, spec: &DagSpec, run: &mut DagRun, cancel: CancellationToken) {
        let handler = if cancel.is_cancelled() {
            spec.handlers.on_cancel.as_deref()
        } else if run.status == DagRunStatus::Succeeded {
            spec.handlers.on_success.as_deref()
        } else {
            spec.handlers.on_failure.as_deref()
        };

        if let Some(command) = handler {
            info!(run_id = %run.run_id, "running lifecycle handler");
            let _ = executor::run_step(
                command,
                None,
                CancellationToken::new(),
                self.config.shutdown_grace,
                |_| {},
                |_| {},
            )
            .await;
        }

        // on_exit always runs last and never changes the already-decided
        // terminal status (§4.7 step 5, resolved Open Question).
        if let Some(command) = spec.handlers.on_exit.as_deref() {
            if let Err(err) = executor::run_step(
                command,
                None,
                CancellationToken::new(),
                self.config.shutdown_grace,
                |_| {},
                |_| {},
            )
            .await
            {
                warn!(run_id = %run.run_id, error = %err, "on_exit handler failed");
                let message = format!("on_exit handler failed: {err}");
                run.error = Some(RunError { kind: RunErrorKind::NodeFailed, message, step: None });
            }
        }
    }
}

trait TapName {
    fn tap_name(self, step_name: String) -> NodeOutcome;
}

impl TapName for NodeOutcome {
    fn tap_name(mut self, step_name: String) -> NodeOutcome {
        self.step_name = step_name;
        self
    }
}

async fn run_local_node(
    step: &StepSpec,
    shutdown_grace: Duration,
    cancel: CancellationToken,
) -> Result<NodeOutcome, NodeOutcome> {
    let Some(command) = step.command.as_deref() else {
        return Err(failed_outcome(&step.name, "step has neither command, call, nor parallel"));
    };
    match executor::run_step(command, step.output.as_deref(), cancel, shutdown_grace, |_| {}, |_| {}).await {
        Ok(outcome) => {
            let mut output_variables = HashMap::new();
            if let (Some(name), Some(value)) = (step.output.as_deref(), outcome.output_value) {
                output_variables.insert(name.to_string(), value);
            }
            Ok(NodeOutcome {
                step_name: step.name.clone(),
                status: NodeStatus::Succeeded,
                output_variables,
                sub_runs: Vec::new(),
                error: None,
            })
        }
        Err(err) => Err(failed_outcome(&step.name, &err.to_string())),
    }
}

async fn run_remote_node(
    step: &StepSpec,
    dispatcher: Option<Arc<dyn StepDispatcher>>,
    run_id: RunId,
    dispatch_timeout: Duration,
) -> Result<NodeOutcome, NodeOutcome> {
    let Some(dispatcher) = dispatcher else {
        return Err(failed_outcome(&step.name, "no step dispatcher configured for remote step"));
    };
    let command = step.command.clone().unwrap_or_default();
    match dispatcher
        .dispatch_step(run_id, &step.name, &command, step.worker_selector.clone(), dispatch_timeout)
        .await
    {
        Ok(railtrack_core::TaskOutcome::Succeeded) => Ok(NodeOutcome {
            step_name: step.name.clone(),
            status: NodeStatus::Succeeded,
            output_variables: HashMap::new(),
            sub_runs: Vec::new(),
            error: None,
        }),
        Ok(railtrack_core::TaskOutcome::Lost) => Err(failed_outcome(&step.name, "worker_lost")),
        Ok(railtrack_core::TaskOutcome::Cancelled) => {
            let mut outcome = failed_outcome(&step.name, "cancelled");
            outcome.status = NodeStatus::Aborted;
            Err(outcome)
        }
        Ok(railtrack_core::TaskOutcome::Failed) => Err(failed_outcome(&step.name, "node_failed")),
        Err(AgentError::NoMatchingWorker(_)) => Err(failed_outcome(&step.name, "no_matching_workers")),
        Err(err) => Err(failed_outcome(&step.name, &err.to_string())),
    }
}

async fn run_subdag_node(
    step: &StepSpec,
    child_dag: &str,
    resolver: &Arc<dyn DagResolver>,
    dagrun_store: Arc<DagRunStore>,
    _parent_dag: String,
    parent_run_id: RunId,
    cancel: CancellationToken,
) -> Result<NodeOutcome, NodeOutcome> {
    let Some(child_spec) = resolver.resolve(child_dag) else {
        return Err(failed_outcome(&step.name, &format!("unknown child dag {child_dag:?}")));
    };
    let child_run_id = RunId::new();
    let sub_agent = Agent {
        dagrun_store,
        resolver: resolver.clone(),
        dispatcher: None,
        clock: railtrack_core::SystemClock,
        config: AgentConfig::default(),
    };
    let child_params = step.params.clone();
    let child_run = sub_agent
        .run(
            &child_spec,
            child_run_id,
            child_params.clone(),
            Some(parent_run_id),
            Some(parent_run_id),
            Operation::Start,
            cancel,
        )
        .await
        .map_err(|err| failed_outcome(&step.name, &err.to_string()))?;

    let sub_run = SubRunRef { run_id: child_run_id, dag_name: child_dag.to_string(), params: child_params };
    if child_run.status == DagRunStatus::Succeeded {
        Ok(NodeOutcome {
            step_name: step.name.clone(),
            status: NodeStatus::Succeeded,
            output_variables: child_run
                .nodes
                .iter()
                .flat_map(|n| n.output_variables.clone())
                .collect(),
            sub_runs: vec![sub_run],
            error: None,
        })
    } else {
        let mut outcome = failed_outcome(&step.name, "child run did not succeed");
        outcome.sub_runs = vec![sub_run];
        Err(outcome)
    }
}

async fn run_parallel_node(
    step: &StepSpec,
    parallel: &ParallelSpec,
    resolver: &Arc<dyn DagResolver>,
    dagrun_store: Arc<DagRunStore>,
    parent_dag: String,
    parent_run_id: RunId,
    cancel: CancellationToken,
) -> Result<NodeOutcome, NodeOutcome> {
    let Some((_, items_json)) = step.params.iter().find(|(k, _)| k == &parallel.items) else {
        return Err(failed_outcome(&step.name, &format!("no param bound for parallel.items {:?}", parallel.items)));
    };
    let items: Vec<String> = serde_json::from_str(items_json)
        .map_err(|err| failed_outcome(&step.name, &format!("parallel.items is not a JSON array: {err}")))?;

    let max_concurrent = parallel.max_concurrent.map(|n| n as usize).unwrap_or(items.len().max(1));
    let mut slots: Vec<Option<serde_json::Value>> = vec![None; items.len()];
    let mut sub_runs = Vec::new();
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for (chunk_start, chunk) in items.chunks(max_concurrent.max(1)).enumerate().map(|(i, c)| (i * max_concurrent.max(1), c)) {
        let mut set = JoinSet::new();
        for (offset, item) in chunk.iter().enumerate() {
            let index = chunk_start + offset;
            let item = item.clone();
            let resolver = resolver.clone();
            let dagrun_store = dagrun_store.clone();
            let parent_dag = parent_dag.clone();
            let cancel = cancel.clone();
            let child_dag_name = step.call.clone();
            let params = vec![("item".to_string(), item.clone())];
            set.spawn(async move {
                if let Some(child_dag) = child_dag_name {
                    let Some(child_spec) = resolver.resolve(&child_dag) else {
                        return (index, item, params, None, Err("unknown child dag".to_string()));
                    };
                    let child_run_id = RunId::new();
                    let sub_agent = Agent {
                        dagrun_store,
                        resolver: resolver.clone(),
                        dispatcher: None,
                        clock: railtrack_core::SystemClock,
                        config: AgentConfig::default(),
                    };
                    match sub_agent
                        .run(&child_spec, child_run_id, params.clone(), Some(parent_run_id), Some(parent_run_id), Operation::Start, cancel)
                        .await
                    {
                        Ok(run) if run.status == DagRunStatus::Succeeded => {
                            let output: HashMap<String, String> =
                                run.nodes.iter().flat_map(|n| n.output_variables.clone()).collect();
                            (index, item, params, Some((child_run_id, child_dag, parent_dag)), Ok(output))
                        }
                        Ok(run) => (
                            index,
                            item,
                            params,
                            Some((child_run_id, child_dag, parent_dag)),
                            Err(format!("child run did not succeed: {:?}", run.status)),
                        ),
                        Err(err) => (index, item, params, None, Err(err.to_string())),
                    }
                } else {
                    (index, item, params, None, Err("parallel step requires call:".to_string()))
                }
            });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, item, params, sub_run_info, result)) => {
                    if let Some((run_id, dag_name, _)) = sub_run_info {
                        sub_runs.push(SubRunRef { run_id, dag_name, params: vec![("item".to_string(), item.clone())] });
                    }
                    let (ok, output) = match &result {
                        Ok(output) => (true, serde_json::to_value(output).unwrap_or(serde_json::Value::Null)),
                        Err(_) => (false, serde_json::Value::Null),
                    };
                    if ok {
                        succeeded += 1;
                    } else {
                        failed += 1;
                    }
                    let params_json: HashMap<String, String> = params.into_iter().collect();
                    slots[index] = Some(serde_json::json!({ "params": params_json, "output": output, "ok": ok }));
                }
                Err(err) => {
                    warn!(error = %err, "parallel child task panicked");
                    failed += 1;
                }
            }
        }
    }

    let results: Vec<serde_json::Value> = slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| serde_json::json!({ "params": {}, "output": null, "ok": false })))
        .collect();
    let summary = serde_json::json!({
        "total": items.len(),
        "succeeded": succeeded,
        "failed": failed,
        "results": results,
    });
    let mut output_variables = HashMap::new();
    output_variables.insert("RESULTS".to_string(), summary.to_string());

    if failed > 0 {
        let mut outcome = failed_outcome(&step.name, "one or more parallel children failed");
        outcome.output_variables = output_variables;
        outcome.sub_runs = sub_runs;
        Err(outcome)
    } else {
        Ok(NodeOutcome {
            step_name: step.name.clone(),
            status: NodeStatus::Succeeded,
            output_variables,
            sub_runs,
            error: None,
        })
    }
}

fn failed_outcome(step_name: &str, error: &str) -> NodeOutcome {
    NodeOutcome {
        step_name: step_name.to_string(),
        status: NodeStatus::Failed,
        output_variables: HashMap::new(),
        sub_runs: Vec::new(),
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railtrack_core::{DagRunStatus as Status, FakeClock};
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    fn agent(dagrun_store: Arc<DagRunStore>) -> Agent<FakeClock> {
        Agent::new(
            dagrun_store,
            Arc::new(crate::resolver::StaticDagResolver::new(Vec::<DagSpec>::new())),
            None,
            FakeClock::new(),
            AgentConfig { dispatch_timeout: StdDuration::from_secs(1), shutdown_grace: StdDuration::from_millis(50) },
        )
    }

    #[tokio::test]
    async fn linear_chain_of_local_steps_succeeds() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(DagRunStore::new(dir.path()));
        let spec = DagSpec::from_yaml(
            "name: pipeline\nsteps:\n  - name: a\n    command: \"echo hi\"\n  - name: b\n    command: \"echo bye\"\n    depends: [a]\n",
        )
        .expect("valid spec");

        let run = agent(store)
            .run(&spec, RunId::new(), Vec::new(), None, None, Operation::Start, CancellationToken::new())
            .await
            .expect("run completes");

        assert_eq!(run.status, Status::Succeeded);
        assert_eq!(run.node("a").expect("a").status, NodeStatus::Succeeded);
        assert_eq!(run.node("b").expect("b").status, NodeStatus::Succeeded);
    }

    #[tokio::test]
    async fn failing_step_fails_the_run_and_skips_descendants() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(DagRunStore::new(dir.path()));
        let spec = DagSpec::from_yaml(
            "name: pipeline\nsteps:\n  - name: a\n    command: \"exit 1\"\n  - name: b\n    command: \"echo bye\"\n    depends: [a]\n",
        )
        .expect("valid spec");

        let run = agent(store)
            .run(&spec, RunId::new(), Vec::new(), None, None, Operation::Start, CancellationToken::new())
            .await
            .expect("run completes");

        assert_eq!(run.status, Status::Failed);
        assert_eq!(run.node("a").expect("a").status, NodeStatus::Failed);
        assert_eq!(run.node("b").expect("b").status, NodeStatus::NotStarted);
    }

    #[tokio::test]
    async fn continue_on_failure_lets_dependents_run_as_partial_success() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(DagRunStore::new(dir.path()));
        let spec = DagSpec::from_yaml(
            "name: pipeline\nsteps:\n  - name: a\n    command: \"exit 1\"\n  - name: b\n    command: \"echo bye\"\n    depends: [a]\n    continue_on_failure: true\n",
        )
        .expect("valid spec");

        let run = agent(store)
            .run(&spec, RunId::new(), Vec::new(), None, None, Operation::Start, CancellationToken::new())
            .await
            .expect("run completes");

        assert_eq!(run.status, Status::PartialSuccess);
        assert_eq!(run.node("b").expect("b").status, NodeStatus::Succeeded);
    }

    #[tokio::test]
    async fn output_variable_is_captured_from_final_stdout_line() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(DagRunStore::new(dir.path()));
        let spec = DagSpec::from_yaml(
            "name: pipeline\nsteps:\n  - name: a\n    command: \"echo RESULT=7\"\n    output: RESULT\n",
        )
        .expect("valid spec");

        let run = agent(store)
            .run(&spec, RunId::new(), Vec::new(), None, None, Operation::Start, CancellationToken::new())
            .await
            .expect("run completes");

        assert_eq!(run.node("a").expect("a").output_variables.get("RESULT"), Some(&"7".to_string()));
    }

    #[tokio::test]
    async fn cyclic_spec_fails_fast_without_running_any_step() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(DagRunStore::new(dir.path()));
        let spec = DagSpec::from_yaml(
            "name: pipeline\nsteps:\n  - name: a\n    depends: [b]\n    command: \"echo a\"\n  - name: b\n    depends: [a]\n    command: \"echo b\"\n",
        )
        .expect("valid spec");

        let run = agent(store)
            .run(&spec, RunId::new(), Vec::new(), None, None, Operation::Start, CancellationToken::new())
            .await
            .expect("run completes");

        assert_eq!(run.status, Status::Failed);
        assert_eq!(run.error.expect("error recorded").kind, RunErrorKind::InvalidGraph);
    }

    struct NoWorkerDispatcher;

    #[async_trait::async_trait]
    impl crate::dispatch::StepDispatcher for NoWorkerDispatcher {
        async fn dispatch_step(
            &self,
            _run_id: RunId,
            step_name: &str,
            _command: &str,
            _worker_selector: HashMap<String, String>,
            _dispatch_timeout: StdDuration,
        ) -> Result<railtrack_core::TaskOutcome, AgentError> {
            Err(AgentError::NoMatchingWorker(step_name.to_string()))
        }
    }

    #[tokio::test]
    async fn no_matching_worker_fails_the_run_with_that_error_kind() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(DagRunStore::new(dir.path()));
        let spec = DagSpec::from_yaml(
            "name: pipeline\nsteps:\n  - name: a\n    command: \"echo hi\"\n    worker_selector:\n      type: nonexistent-worker\n",
        )
        .expect("valid spec");

        let agent = Agent::new(
            store,
            Arc::new(crate::resolver::StaticDagResolver::new(Vec::<DagSpec>::new())),
            Some(Arc::new(NoWorkerDispatcher)),
            FakeClock::new(),
            AgentConfig { dispatch_timeout: StdDuration::from_secs(1), shutdown_grace: StdDuration::from_millis(50) },
        );
        let run = agent
            .run(&spec, RunId::new(), Vec::new(), None, None, Operation::Start, CancellationToken::new())
            .await
            .expect("run completes");

        assert_eq!(run.status, Status::Failed);
        assert_eq!(run.error.expect("error recorded").kind, RunErrorKind::NoMatchingWorker);
    }

    #[tokio::test]
    async fn retry_resets_only_failed_nodes_and_preserves_succeeded_outputs() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(DagRunStore::new(dir.path()));
        let run_id = RunId::new();
        let spec = DagSpec::from_yaml(
            "name: pipeline\nsteps:\n  - name: a\n    command: \"echo RESULT=1\"\n    output: RESULT\n  - name: b\n    command: \"exit 1\"\n    depends: [a]\n",
        )
        .expect("valid spec");

        let first = agent(store.clone())
            .run(&spec, run_id, Vec::new(), None, None, Operation::Start, CancellationToken::new())
            .await
            .expect("first attempt completes");
        assert_eq!(first.status, Status::Failed);
        assert_eq!(first.node("a").expect("a").status, NodeStatus::Succeeded);

        let retried = agent(store)
            .run(&spec, run_id, Vec::new(), None, None, Operation::Retry, CancellationToken::new())
            .await
            .expect("retry completes");

        assert_eq!(retried.node("a").expect("a").status, NodeStatus::Succeeded);
        assert_eq!(
            retried.node("a").expect("a").output_variables.get("RESULT"),
            Some(&"1".to_string())
        );
    }
}
