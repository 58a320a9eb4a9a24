use std::sync::Arc;

use tracing::{info, warn};

use warden_core::config::KernelConfig;
use warden_core::error::{Result, WardenError};
use warden_core::event::EventBus;
use warden_core::governance::{ApprovalRequest, GovernanceState};
use warden_core::graph::{ExecutionGraph, ValidationReport};
use warden_core::traits::Executor;
use warden_core::types::ExecutionContext;
use warden_governance::GovernanceEngine;
use warden_graph::{ExecutionPlan, ExecutionSnapshot, GraphEngine, GraphRuntime, LocalityPolicy, Planner};
use warden_routing::{CapabilityRouter, WorkerRegistry};
use warden_sandbox::DockerExecutor;

/// Wires governance, graph engine, router and executor into one pipeline.
pub struct Kernel {
    config: KernelConfig,
    event_bus: Arc<EventBus>,
    governance: Arc<GovernanceEngine>,
    router: Arc<CapabilityRouter>,
    graphs: GraphEngine,
    executor: Arc<dyn Executor>,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
        let governance = Arc::new(GovernanceEngine::new(
            config.governance.role,
            event_bus.clone(),
        ));
        let registry = Arc::new(WorkerRegistry::from_profiles(config.workers.clone())?);
        let router = Arc::new(CapabilityRouter::new(registry, config.routing.clone()));
        let graphs = GraphEngine::new(Arc::new(LocalityPolicy::from_config(&config.locality)?));
        let executor: Arc<dyn Executor> = Arc::new(DockerExecutor::new(
            governance.clone(),
            router.clone(),
            &config,
        ));

        Ok(Self {
            config,
            event_bus,
            governance,
            router,
            graphs,
            executor,
        })
    }

    /// Replace the execution backend.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn governance(&self) -> &Arc<GovernanceEngine> {
        &self.governance
    }

    pub fn router(&self) -> &Arc<CapabilityRouter> {
        &self.router
    }

    pub fn graphs(&self) -> &GraphEngine {
        &self.graphs
    }

    pub fn validate(&self, graph: &ExecutionGraph) -> ValidationReport {
        self.graphs.validate_graph(graph)
    }

    pub fn plan(&self, graph: &ExecutionGraph) -> Result<ExecutionPlan> {
        Planner.plan(graph)
    }

    /// Drive review, approval and start for `graph` as the configured actor.
    pub fn authorize(&self, graph: &ExecutionGraph) -> Result<()> {
        let actor = &self.config.governance.actor;
        let request = ApprovalRequest::execution_start(format!(
            "Execute graph {} ({} nodes)",
            graph.id,
            graph.len()
        ));
        self.governance.request_review(&graph.id, request)?;
        self.governance.approve(actor, "approved from the command line")?;
        self.governance.start_execution(actor)
    }

    /// Validate and run a graph under the current governance session.
    ///
    /// Governance must already be `EXECUTING` for this graph. A fully
    /// successful run completes the session; a failed one leaves it open.
    pub async fn execute(
        &self,
        mut graph: ExecutionGraph,
        ctx: ExecutionContext,
    ) -> Result<ExecutionSnapshot> {
        let report = self.graphs.mark_validated(&mut graph);
        if !report.is_valid {
            return Err(WardenError::InvalidGraph(report.errors.join("; ")));
        }

        let state = self.governance.state();
        if state != GovernanceState::Executing {
            return Err(WardenError::InvalidTransition {
                action: "execute".into(),
                state: state.to_string(),
            });
        }
        let reviewed = self.governance.context().graph_id;
        if reviewed.as_deref() != Some(graph.id.as_str()) {
            return Err(WardenError::InvalidTransition {
                action: format!("execute graph {}", graph.id),
                state: format!("{} for {}", state, reviewed.unwrap_or_default()),
            });
        }

        info!(
            graph_id = %graph.id,
            run_id = %ctx.run_id,
            executor = self.executor.name(),
            dry_run = ctx.dry_run,
            replay = ctx.is_replay,
            "Executing graph"
        );
        let mut runtime = GraphRuntime::new(graph, self.executor.clone(), ctx)
            .with_event_bus(self.event_bus.clone());
        let snapshot = runtime.run().await?;
        self.governance.set_active_node(None);

        if snapshot.succeeded() {
            self.governance.complete(&self.config.governance.actor)?;
        } else {
            warn!(run_id = %snapshot.context.run_id, counts = ?snapshot.status_counts(), "Run did not succeed");
        }
        Ok(snapshot)
    }
}
