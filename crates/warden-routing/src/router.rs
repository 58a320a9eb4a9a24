use std::sync::Arc;

use tracing::{info, warn};

use warden_core::config::RoutingConfig;
use warden_core::graph::{ExecutionConstraints, NetworkAccess, NodeSpec};
use warden_core::worker::{
    ResolvedTarget, ResourceGrant, RoutingDecision, RoutingError, WorkerProfile, WorkerStatus,
};

use crate::registry::WorkerRegistry;

/// Picks exactly one worker per node, or explains why none qualifies.
///
/// Selection is deterministic: local workers first, then lowest id.
pub struct CapabilityRouter {
    registry: Arc<WorkerRegistry>,
    config: RoutingConfig,
}

impl CapabilityRouter {
    pub fn new(registry: Arc<WorkerRegistry>, config: RoutingConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn route(&self, node: &NodeSpec) -> RoutingDecision {
        let mut reasoning = vec![
            format!("Routing node {} ({})", node.name, node.id),
            format!("Required capability: {}", node.capability),
            format!("Required model: {}", node.model),
        ];

        let result = self.select(node, &mut reasoning);
        match &result {
            Ok(target) => info!(
                node_id = %node.id,
                worker_id = %target.worker_id,
                mode = %target.execution_mode,
                "Node routed"
            ),
            Err(code) => warn!(node_id = %node.id, code = %code, "Routing failed"),
        }
        RoutingDecision { result, reasoning }
    }

    fn select(
        &self,
        node: &NodeSpec,
        reasoning: &mut Vec<String>,
    ) -> Result<ResolvedTarget, RoutingError> {
        let candidates: Vec<WorkerProfile> = self
            .registry
            .workers()
            .into_iter()
            .filter(|w| w.supports(node.capability))
            .collect();
        if candidates.is_empty() {
            reasoning.push(format!("No worker offers capability {}", node.capability));
            return Err(RoutingError::NoCapabilityMatch);
        }
        reasoning.push(format!("Capability matches: {}", ids(&candidates)));

        let candidates: Vec<WorkerProfile> = candidates
            .into_iter()
            .filter(|w| w.serves_model(&node.model))
            .collect();
        if candidates.is_empty() {
            reasoning.push(format!("No capable worker serves model {}", node.model));
            return Err(RoutingError::ModelNotSupported);
        }
        reasoning.push(format!("Model matches: {}", ids(&candidates)));

        let candidates: Vec<WorkerProfile> = candidates
            .into_iter()
            .filter(|w| w.status == WorkerStatus::Online)
            .collect();
        if candidates.is_empty() {
            reasoning.push("No matching worker is online".to_string());
            return Err(RoutingError::NoWorkersAvailable);
        }
        reasoning.push(format!("Online: {}", ids(&candidates)));

        let mut survivors = Vec::new();
        for worker in candidates {
            match check_constraints(&worker, &node.constraints) {
                Ok(()) => survivors.push(worker),
                Err(code) => reasoning.push(format!("Worker {} rejected: {}", worker.id, code)),
            }
        }
        if survivors.is_empty() {
            reasoning.push("No worker satisfies the node constraints".to_string());
            return Err(RoutingError::NoWorkersAvailable);
        }

        survivors.sort_by(|a, b| {
            b.resources
                .is_local
                .cmp(&a.resources.is_local)
                .then_with(|| a.id.cmp(&b.id))
        });
        let selected = &survivors[0];

        if survivors.len() > 1 {
            let tied: Vec<WorkerProfile> = survivors
                .iter()
                .filter(|w| w.resources.is_local == selected.resources.is_local)
                .cloned()
                .collect();
            if tied.len() > 1 && self.config.reject_ambiguous {
                reasoning.push(format!(
                    "Ambiguous: {} equally preferred workers ({})",
                    tied.len(),
                    ids(&tied)
                ));
                return Err(RoutingError::AmbiguousRouting);
            }
            reasoning.push(format!(
                "Multiple candidates found. Selected {} via deterministic sort.",
                selected.id
            ));
        }

        let grant = self.grant(&node.constraints);
        reasoning.push(format!(
            "Granted gpu={} memory_mb={} network={} timeout_ms={} on {}",
            grant.gpu_allocated, grant.memory_mb, grant.network_access, grant.timeout_ms, selected.id
        ));

        Ok(ResolvedTarget {
            worker_id: selected.id.clone(),
            execution_mode: selected.execution_mode,
            resource_grant: grant,
        })
    }

    fn grant(&self, constraints: &ExecutionConstraints) -> ResourceGrant {
        ResourceGrant {
            gpu_allocated: constraints.requires_gpu,
            memory_mb: constraints
                .memory_limit_mb
                .unwrap_or(self.config.default_memory_mb),
            network_access: constraints.network_access,
            timeout_ms: constraints
                .max_duration_ms
                .unwrap_or(self.config.default_timeout_ms),
        }
    }
}

/// First hard constraint the worker violates, if any.
fn check_constraints(
    worker: &WorkerProfile,
    constraints: &ExecutionConstraints,
) -> Result<(), RoutingError> {
    let res = &worker.resources;
    if constraints.local_only && !res.is_local {
        return Err(RoutingError::ConstraintViolationLocal);
    }
    if constraints.requires_gpu && !res.has_gpu {
        return Err(RoutingError::ConstraintViolationGpu);
    }
    if let Some(limit) = constraints.memory_limit_mb {
        if res.max_memory_mb < limit {
            return Err(RoutingError::ConstraintViolationMemory);
        }
    }
    if constraints.network_access == NetworkAccess::Full && res.network_isolated {
        return Err(RoutingError::ConstraintViolationNetwork);
    }
    Ok(())
}

fn ids(workers: &[WorkerProfile]) -> String {
    workers
        .iter()
        .map(|w| w.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
