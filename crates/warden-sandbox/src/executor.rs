use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::{info, warn};

use warden_core::config::KernelConfig;
use warden_core::config::SandboxConfig;
use warden_core::error::Result;
use warden_core::governance::GovernanceState;
use warden_core::graph::NodeSpec;
use warden_core::traits::{Executor, GovernancePort};
use warden_core::types::{ExecutionContext, NodeExecutionResult};
use warden_core::worker::ExecutionMode;
use warden_governance::GovernanceEngine;
use warden_routing::CapabilityRouter;

use crate::container::ContainerSpec;
use crate::guardrail::Guardrails;
use crate::refusal::SandboxRefusal;

/// Executor that describes a container launch for each node, after
/// re-checking governance, routing, policy and guardrails.
///
/// Only `local_docker` targets are accepted; any other routed mode is
/// refused with `FAIL_CLOSED_NON_DOCKER_TARGET`.
///
/// Nothing is started; the output carries the command preview and the
/// Docker API create request for a later stage to run.
pub struct DockerExecutor {
    governance: Arc<GovernanceEngine>,
    router: Arc<CapabilityRouter>,
    guardrails: Guardrails,
    config: SandboxConfig,
}

impl DockerExecutor {
    pub fn new(
        governance: Arc<GovernanceEngine>,
        router: Arc<CapabilityRouter>,
        config: &KernelConfig,
    ) -> Self {
        Self {
            governance,
            router,
            guardrails: Guardrails::new(config.guardrails.clone()),
            config: config.sandbox.clone(),
        }
    }

    async fn describe(
        &self,
        node: &NodeSpec,
        inputs: &BTreeMap<String, serde_json::Value>,
        ctx: &ExecutionContext,
    ) -> Result<std::result::Result<NodeExecutionResult, SandboxRefusal>> {
        match self.governance.state() {
            GovernanceState::Executing => {}
            GovernanceState::Halted => return Ok(Err(SandboxRefusal::Halted)),
            other => return Ok(Err(SandboxRefusal::NotExecuting(other))),
        }
        self.governance.set_active_node(Some(&node.id));

        let decision = self.router.route(node);
        let target = match decision.result {
            Ok(target) => target,
            Err(code) => return Ok(Err(SandboxRefusal::Routing(code))),
        };
        if target.execution_mode != ExecutionMode::LocalDocker {
            return Ok(Err(SandboxRefusal::NonDockerTarget));
        }

        let mut policy_ctx = serde_json::Map::new();
        policy_ctx.insert("run_id".into(), json!(ctx.run_id));
        policy_ctx.insert("node_id".into(), json!(node.id));
        policy_ctx.insert("worker_id".into(), json!(target.worker_id));
        let outcome = self
            .governance
            .request_approval(
                &ctx.graph_id,
                node.capability,
                &node.model,
                &node.constraints,
                &policy_ctx,
            )
            .await;
        if !outcome.is_allowed() {
            return Ok(Err(SandboxRefusal::Policy {
                kind: outcome.kind(),
                code: outcome.code(),
            }));
        }

        if let Err(refusal) = self.guardrails.check(node, inputs, ctx) {
            return Ok(Err(refusal));
        }

        let spec = ContainerSpec::build(node, inputs, &target.resource_grant, ctx, &self.config);
        let mut output = BTreeMap::new();
        for slot in &node.outputs {
            output.insert(
                slot.name.clone(),
                json!(format!("/outputs/{}/{}", node.id, slot.name)),
            );
        }
        output.insert("commandPreview".into(), json!(spec.to_command_preview()));
        output.insert(
            "containerConfig".into(),
            serde_json::to_value(spec.to_container_config())?,
        );
        output.insert("containerSpec".into(), serde_json::to_value(&spec)?);
        output.insert("workerId".into(), json!(target.worker_id));
        output.insert("auditReasoning".into(), json!(decision.reasoning));
        output.insert("nodeId".into(), json!(node.id));

        info!(node_id = %node.id, worker_id = %target.worker_id, image = %spec.image, "Container described");
        Ok(Ok(NodeExecutionResult::success(output)))
    }
}

impl Executor for DockerExecutor {
    fn name(&self) -> &str {
        "docker"
    }

    fn execute_node<'a>(
        &'a self,
        node: &'a NodeSpec,
        inputs: BTreeMap<String, serde_json::Value>,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeExecutionResult>> {
        Box::pin(async move {
            match self.describe(node, &inputs, ctx).await? {
                Ok(result) => Ok(result),
                Err(refusal) => {
                    warn!(node_id = %node.id, code = %refusal, "Sandbox refused node");
                    Ok(NodeExecutionResult::failure(refusal.to_string()))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use warden_core::event::EventBus;
    use warden_core::governance::{ApprovalRequest, UserRole};
    use warden_core::graph::{Capability, ExecutionConstraints, NetworkAccess};
    use warden_routing::WorkerRegistry;
    use warden_test_utils::video_node;

    use super::*;

    struct Harness {
        governance: Arc<GovernanceEngine>,
        executor: DockerExecutor,
        ctx: ExecutionContext,
    }

    fn harness() -> Harness {
        let config = KernelConfig::default();
        let governance = Arc::new(GovernanceEngine::new(
            UserRole::Admin,
            Arc::new(EventBus::default()),
        ));
        let router = Arc::new(CapabilityRouter::new(
            Arc::new(WorkerRegistry::with_defaults()),
            config.routing.clone(),
        ));
        let executor = DockerExecutor::new(governance.clone(), router, &config);
        Harness {
            governance,
            executor,
            ctx: ExecutionContext::new("g1", "ws"),
        }
    }

    fn start(governance: &GovernanceEngine) {
        governance
            .request_review("g1", ApprovalRequest::execution_start("run"))
            .unwrap();
        governance.approve("admin", "ok").unwrap();
        governance.start_execution("admin").unwrap();
    }

    fn literal_inputs(node: &NodeSpec) -> BTreeMap<String, serde_json::Value> {
        node.inputs
            .iter()
            .filter_map(|(k, b)| match b {
                warden_core::graph::InputBinding::Literal { value } => {
                    Some((k.clone(), value.clone()))
                }
                _ => None,
            })
            .collect()
    }

    async fn run(h: &Harness, node: &NodeSpec) -> NodeExecutionResult {
        h.executor
            .execute_node(node, literal_inputs(node), &h.ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn video_guardrails() {
        let h = harness();
        start(&h.governance);

        let too_long = run(&h, &video_node("v1", 15.0, "a sunset")).await;
        assert!(!too_long.success);
        assert_eq!(too_long.error.as_deref(), Some("DURATION_EXCEEDS_12S_OR_INVALID"));

        let ok = run(&h, &video_node("v1", 8.0, "a sunset")).await;
        assert!(ok.success, "{:?}", ok.error);
        assert_eq!(ok.output["workerId"], "local-video-01");
        assert_eq!(ok.output["nodeId"], "v1");
        assert_eq!(ok.output["video"], "/outputs/v1/video");
        let preview = ok.output["commandPreview"].as_str().unwrap();
        assert!(preview.contains("--gpus all"));
        assert!(preview.contains("stable-video-diffusion:latest"));
        assert!(ok.output["auditReasoning"].as_array().unwrap().len() > 3);
        assert_eq!(
            ok.output["containerConfig"]["HostConfig"]["NetworkMode"],
            "none"
        );

        let repeat = run(&h, &video_node("v1", 8.0, "a sunset")).await;
        assert_eq!(repeat.error.as_deref(), Some("PROMPT_REPETITION_REFUSED"));
        assert!(repeat.output.is_empty());
    }

    #[tokio::test]
    async fn refuses_outside_executing() {
        let h = harness();
        let idle = run(&h, &video_node("v1", 8.0, "x")).await;
        assert_eq!(idle.error.as_deref(), Some("DENY_BY_DEFAULT_STATE_IDLE"));

        h.governance
            .request_review("g1", ApprovalRequest::execution_start("run"))
            .unwrap();
        let pending = run(&h, &video_node("v1", 8.0, "x")).await;
        assert_eq!(
            pending.error.as_deref(),
            Some("DENY_BY_DEFAULT_STATE_REVIEW_PENDING")
        );

        h.governance.halt("admin", "stop").unwrap();
        let halted = run(&h, &video_node("v1", 8.0, "x")).await;
        assert_eq!(halted.error.as_deref(), Some("EXECUTION_HALTED_BY_GOVERNANCE"));
    }

    #[tokio::test]
    async fn routing_and_mode_fail_closed() {
        let h = harness();
        start(&h.governance);

        let scene = NodeSpec::new("s1", "Scene", Capability::Scene3d, "blender");
        let result = run(&h, &scene).await;
        assert_eq!(
            result.error.as_deref(),
            Some("ROUTING_FAILED_NO_CAPABILITY_MATCH")
        );

        let remote = NodeSpec::new("r1", "Cloud", Capability::Reasoning, "gpt-4o");
        let result = run(&h, &remote).await;
        assert_eq!(result.error.as_deref(), Some("FAIL_CLOSED_NON_DOCKER_TARGET"));

        let orchestrator = NodeSpec::new(
            "o1",
            "Mux",
            Capability::Orchestration,
            "ffmpeg-orchestrator",
        );
        let result = run(&h, &orchestrator).await;
        assert_eq!(result.error.as_deref(), Some("FAIL_CLOSED_NON_DOCKER_TARGET"));
    }

    #[tokio::test]
    async fn policy_port_consulted() {
        let h = harness();
        start(&h.governance);

        let leaky = NodeSpec::new("r1", "Think", Capability::Reasoning, "deepseek-r1")
            .with_constraints(ExecutionConstraints {
                local_only: true,
                network_access: NetworkAccess::Full,
                ..Default::default()
            });
        let result = run(&h, &leaky).await;
        assert_eq!(result.error.as_deref(), Some("POLICY_DENY_INVALID_ISOLATION"));
    }

    #[tokio::test]
    async fn records_active_node() {
        let h = harness();
        start(&h.governance);
        let node = NodeSpec::new("r1", "Think", Capability::Reasoning, "deepseek-r1")
            .with_literal("topic", "rust");
        let result = run(&h, &node).await;
        assert!(result.success);
        assert_eq!(h.governance.context().active_node_id.as_deref(), Some("r1"));
        assert!(result.output["commandPreview"]
            .as_str()
            .unwrap()
            .contains("INPUT_TOPIC=\"rust\""));
    }
}
