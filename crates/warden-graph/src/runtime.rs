use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use warden_core::error::{Result, WardenError};
use warden_core::event::EventBus;
use warden_core::graph::{ExecutionGraph, GraphStatus, InputBinding, NodeSpec};
use warden_core::traits::Executor;
use warden_core::types::{ExecutionContext, KernelEvent};

use crate::planner::{ExecutionPlan, Planner};
use crate::state::{ExecutionSnapshot, NodeRuntimeState, NodeStatus};

/// Final result of all attempts at one node.
struct NodeOutcome {
    node_id: String,
    attempts: u32,
    elapsed_ms: u64,
    result: std::result::Result<BTreeMap<String, serde_json::Value>, String>,
    logs: Vec<String>,
}

/// Runs one graph, stage by stage, against an executor.
///
/// Nodes within a stage run concurrently. A stage with any failed node is
/// the last stage run; nodes in later stages stay `pending`.
pub struct GraphRuntime {
    graph: ExecutionGraph,
    executor: Arc<dyn Executor>,
    plan: Option<ExecutionPlan>,
    snapshot: ExecutionSnapshot,
    event_bus: Option<Arc<EventBus>>,
}

impl GraphRuntime {
    pub fn new(graph: ExecutionGraph, executor: Arc<dyn Executor>, ctx: ExecutionContext) -> Self {
        let snapshot = ExecutionSnapshot::new(&graph, ctx);
        Self {
            graph,
            executor,
            plan: None,
            snapshot,
            event_bus: None,
        }
    }

    /// Publish node lifecycle events on this bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Plan once and cache the result.
    pub fn prepare(&mut self) -> Result<&ExecutionPlan> {
        if self.plan.is_none() {
            let plan = Planner.plan(&self.graph)?;
            info!(
                graph_id = %self.graph.id,
                stages = plan.stages.len(),
                "Plan prepared"
            );
            self.plan = Some(plan);
        }
        self.plan
            .as_ref()
            .ok_or_else(|| WardenError::InvalidGraph("plan unavailable".into()))
    }

    pub fn plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    pub fn snapshot(&self) -> &ExecutionSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> ExecutionSnapshot {
        self.snapshot
    }

    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    /// Run every stage in order and return the final snapshot.
    pub async fn run(&mut self) -> Result<ExecutionSnapshot> {
        let stages = self.prepare()?.stages.clone();
        let ctx = self.snapshot.context.clone();
        let bus = self.event_bus.clone();
        let executor = Arc::clone(&self.executor);
        self.set_graph_status(GraphStatus::Executing);

        for (index, stage) in stages.iter().enumerate() {
            info!(run_id = %ctx.run_id, stage = index, nodes = stage.len(), "Starting stage");
            publish(
                &bus,
                KernelEvent::StageStarted {
                    run_id: ctx.run_id.clone(),
                    index,
                    nodes: stage.clone(),
                },
            );

            let mut ready: Vec<(&NodeSpec, BTreeMap<String, serde_json::Value>)> = Vec::new();
            for node_id in stage {
                let Some(node) = self.graph.nodes.get(node_id) else {
                    continue;
                };
                let resolved = resolve_inputs(node, &self.snapshot.node_states);
                let Some(state) = self.snapshot.node_states.get_mut(node_id) else {
                    continue;
                };
                match resolved {
                    Ok(inputs) => {
                        state.status = NodeStatus::Ready;
                        state.log(format!("inputs resolved: {}", inputs.len()));
                        ready.push((node, inputs));
                    }
                    Err(e) => {
                        let now = Utc::now();
                        state.attempts += 1;
                        state.started_at = Some(now);
                        state.ended_at = Some(now);
                        state.status = NodeStatus::Failed;
                        state.error = Some(e.to_string());
                        state.log(format!("input resolution failed: {}", e));
                        error!(node_id = %node_id, error = %e, "Input resolution failed");
                        publish(
                            &bus,
                            KernelEvent::NodeFailed {
                                run_id: ctx.run_id.clone(),
                                node_id: node_id.clone(),
                                error: e.to_string(),
                            },
                        );
                    }
                }
            }

            let started = Utc::now();
            for (node, _) in &ready {
                if let Some(state) = self.snapshot.node_states.get_mut(&node.id) {
                    state.status = NodeStatus::Running;
                    state.started_at = Some(started);
                }
            }

            let outcomes = join_all(
                ready
                    .into_iter()
                    .map(|(node, inputs)| attempt_node(&*executor, node, inputs, &ctx, &bus)),
            )
            .await;

            for outcome in outcomes {
                self.record(outcome, &ctx, &bus);
            }
            self.snapshot.updated_at = Utc::now();

            let failed = stage.iter().any(|id| {
                self.snapshot
                    .node(id)
                    .is_some_and(|s| s.status == NodeStatus::Failed)
            });
            if failed {
                warn!(run_id = %ctx.run_id, stage = index, "Stage failed, halting run");
                break;
            }
        }

        let succeeded = self.snapshot.succeeded();
        self.set_graph_status(if succeeded {
            GraphStatus::Completed
        } else {
            GraphStatus::Failed
        });
        info!(
            run_id = %ctx.run_id,
            succeeded,
            completed = self.snapshot.count(NodeStatus::Completed),
            failed = self.snapshot.count(NodeStatus::Failed),
            "Run finished"
        );
        publish(
            &bus,
            KernelEvent::RunFinished {
                run_id: ctx.run_id.clone(),
                succeeded,
            },
        );
        self.snapshot.updated_at = Utc::now();
        Ok(self.snapshot.clone())
    }

    fn set_graph_status(&mut self, status: GraphStatus) {
        self.graph.status = status;
        self.snapshot.graph_status = status;
    }

    fn record(&mut self, outcome: NodeOutcome, ctx: &ExecutionContext, bus: &Option<Arc<EventBus>>) {
        let Some(state) = self.snapshot.node_states.get_mut(&outcome.node_id) else {
            return;
        };
        state.attempts += outcome.attempts;
        state.ended_at = Some(Utc::now());
        state.logs.extend(outcome.logs);

        match outcome.result {
            Ok(output) => {
                state.status = NodeStatus::Completed;
                state.output = Some(output);
                state.error = None;
                debug!(node_id = %outcome.node_id, elapsed_ms = outcome.elapsed_ms, "Node completed");
                publish(
                    bus,
                    KernelEvent::NodeCompleted {
                        run_id: ctx.run_id.clone(),
                        node_id: outcome.node_id,
                        elapsed_ms: outcome.elapsed_ms,
                    },
                );
            }
            Err(message) => {
                state.status = NodeStatus::Failed;
                state.output = None;
                state.error = Some(message.clone());
                error!(node_id = %outcome.node_id, error = %message, "Node failed");
                publish(
                    bus,
                    KernelEvent::NodeFailed {
                        run_id: ctx.run_id.clone(),
                        node_id: outcome.node_id,
                        error: message,
                    },
                );
            }
        }
    }
}

fn publish(bus: &Option<Arc<EventBus>>, event: KernelEvent) {
    if let Some(bus) = bus {
        bus.publish(event);
    }
}

/// Literal inputs pass through; references need a completed upstream
/// that produced the named output.
fn resolve_inputs(
    node: &NodeSpec,
    states: &BTreeMap<String, NodeRuntimeState>,
) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut inputs = BTreeMap::new();
    for (name, binding) in &node.inputs {
        let value = match binding {
            InputBinding::Literal { value } => value.clone(),
            InputBinding::Reference {
                source_node_id,
                source_output_name,
            } => states
                .get(source_node_id)
                .filter(|s| s.status == NodeStatus::Completed)
                .and_then(|s| s.output.as_ref())
                .and_then(|out| out.get(source_output_name))
                .cloned()
                .ok_or_else(|| WardenError::DependencyNotReady {
                    node: node.id.clone(),
                    upstream: source_node_id.clone(),
                })?,
        };
        inputs.insert(name.clone(), value);
    }
    Ok(inputs)
}

/// Run a node through its retry policy.
async fn attempt_node(
    executor: &dyn Executor,
    node: &NodeSpec,
    inputs: BTreeMap<String, serde_json::Value>,
    ctx: &ExecutionContext,
    bus: &Option<Arc<EventBus>>,
) -> NodeOutcome {
    let max_attempts = node.max_attempts();
    let backoff_ms = node.retry_policy.map(|r| r.backoff_ms).unwrap_or(0);
    let start = Instant::now();
    let mut logs = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;
        publish(
            bus,
            KernelEvent::NodeStarted {
                run_id: ctx.run_id.clone(),
                node_id: node.id.clone(),
                attempt,
            },
        );
        logs.push(format!("attempt {} started on {}", attempt, executor.name()));

        let failure = match executor.execute_node(node, inputs.clone(), ctx).await {
            Ok(result) if result.success => {
                logs.push(format!("attempt {} completed", attempt));
                return NodeOutcome {
                    node_id: node.id.clone(),
                    attempts: attempt,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    result: Ok(result.output),
                    logs,
                };
            }
            Ok(result) => result
                .error
                .unwrap_or_else(|| "executor reported failure".to_string()),
            Err(e) => e.to_string(),
        };
        logs.push(format!("attempt {} failed: {}", attempt, failure));

        if attempt >= max_attempts {
            return NodeOutcome {
                node_id: node.id.clone(),
                attempts: attempt,
                elapsed_ms: start.elapsed().as_millis() as u64,
                result: Err(failure),
                logs,
            };
        }
        warn!(node_id = %node.id, attempt, max_attempts, error = %failure, "Retrying node");
        if backoff_ms > 0 {
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }
}
