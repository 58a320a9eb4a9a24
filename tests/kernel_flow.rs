use warden::Kernel;
use warden_core::config::KernelConfig;
use warden_core::error::WardenError;
use warden_core::governance::{GovernanceState, UserRole};
use warden_core::graph::{Capability, DataType, ExecutionGraph, GraphStatus, NodeSpec, Priority};
use warden_core::types::{ExecutionContext, KernelEvent};
use warden_graph::NodeStatus;
use warden_test_utils::video_node;

fn kernel() -> Kernel {
    let mut config = KernelConfig::default();
    config.governance.role = UserRole::Admin;
    config.locality.local_models = vec!["stable-video-diffusion".into()];
    Kernel::new(config).expect("kernel")
}

/// `plan.script -> clip.script`, with the clip's duration under test.
fn storyboard(kernel: &Kernel, duration_secs: f64) -> ExecutionGraph {
    let engine = kernel.graphs();
    let mut graph = engine.create_graph("intent-storyboard", Priority::High);
    let plan = NodeSpec::new("plan", "Outline", Capability::Planning, "deepseek-r1")
        .with_literal("topic", "a lighthouse at dusk")
        .with_output("script", DataType::Text);
    engine.add_node(&mut graph, plan).expect("add plan");
    engine
        .add_node(&mut graph, video_node("clip", duration_secs, "lighthouse, slow pan"))
        .expect("add clip");
    engine
        .connect_nodes(&mut graph, "plan", "script", "clip", "script")
        .expect("connect");
    graph
}

#[tokio::test]
async fn governed_run_describes_containers() {
    let kernel = kernel();
    let mut rx = kernel.event_bus().subscribe();
    let graph = storyboard(&kernel, 8.0);
    kernel.authorize(&graph).expect("authorize");

    let ctx = ExecutionContext::new(&graph.id, "ws").with_seed(99);
    let snapshot = kernel.execute(graph, ctx).await.expect("execute");

    assert!(snapshot.succeeded());
    assert_eq!(kernel.governance().state(), GovernanceState::Completed);

    let clip = snapshot.node("clip").expect("clip state");
    let output = clip.output.as_ref().expect("clip output");
    assert_eq!(output["workerId"], "local-video-01");
    assert_eq!(output["video"], "/outputs/clip/video");
    let preview = output["commandPreview"].as_str().expect("preview");
    assert!(preview.contains("-e SEED=\"99\""));
    assert!(preview.contains("--network none"));

    let plan = snapshot.node("plan").expect("plan state");
    assert_eq!(
        plan.output.as_ref().expect("plan output")["workerId"],
        "local-reasoning-01"
    );

    let mut saw_finish = false;
    let mut governance_events = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            KernelEvent::Governance(_) => governance_events += 1,
            KernelEvent::RunFinished { succeeded, .. } => {
                assert!(succeeded);
                saw_finish = true;
            }
            _ => {}
        }
    }
    assert!(saw_finish);
    // review, approve, start, complete
    assert_eq!(governance_events, 4);
}

#[tokio::test]
async fn dry_run_is_visible_to_containers() {
    let kernel = kernel();
    let graph = storyboard(&kernel, 8.0);
    kernel.authorize(&graph).expect("authorize");

    let ctx = ExecutionContext::new(&graph.id, "ws").with_dry_run(true);
    let snapshot = kernel.execute(graph, ctx).await.expect("execute");

    assert!(snapshot.succeeded());
    assert_eq!(snapshot.graph_status, GraphStatus::Completed);
    assert!(snapshot.context.dry_run);
    let clip = snapshot.node("clip").expect("clip state");
    let preview = clip.output.as_ref().expect("clip output")["commandPreview"]
        .as_str()
        .expect("preview");
    assert!(preview.contains("-e WARDEN_DRY_RUN=\"1\""));
    assert!(!preview.contains("WARDEN_REPLAY"));
}

#[tokio::test]
async fn guardrail_refusal_fails_the_run() {
    let kernel = kernel();
    let graph = storyboard(&kernel, 15.0);
    kernel.authorize(&graph).expect("authorize");

    let ctx = ExecutionContext::new(&graph.id, "ws");
    let snapshot = kernel.execute(graph, ctx).await.expect("execute");

    assert!(!snapshot.succeeded());
    assert_eq!(snapshot.node("plan").expect("plan").status, NodeStatus::Completed);
    let clip = snapshot.node("clip").expect("clip");
    assert_eq!(clip.status, NodeStatus::Failed);
    assert_eq!(clip.error.as_deref(), Some("DURATION_EXCEEDS_12S_OR_INVALID"));
    assert_eq!(kernel.governance().state(), GovernanceState::Executing);
}

#[tokio::test]
async fn halted_governance_blocks_execution() {
    let kernel = kernel();
    let graph = storyboard(&kernel, 8.0);
    kernel.authorize(&graph).expect("authorize");
    kernel
        .governance()
        .halt("admin", "operator pulled the plug")
        .expect("halt");

    let ctx = ExecutionContext::new(&graph.id, "ws");
    let err = kernel.execute(graph, ctx).await.unwrap_err();
    assert!(matches!(err, WardenError::InvalidTransition { .. }));
    assert_eq!(
        kernel.governance().context().security_alerts,
        vec!["operator pulled the plug".to_string()]
    );
}

#[tokio::test]
async fn non_local_model_fails_validation() {
    let kernel = kernel();
    let engine = kernel.graphs();
    let mut graph = engine.create_graph("intent-remote", Priority::Normal);
    let mut node = video_node("clip", 8.0, "harbor");
    node.model = "opensora".into();
    engine.add_node(&mut graph, node).expect("add");

    kernel.authorize(&graph).expect("authorize");
    let ctx = ExecutionContext::new(&graph.id, "ws");
    match kernel.execute(graph, ctx).await {
        Err(WardenError::InvalidGraph(message)) => {
            assert!(message.contains("requires local execution but uses non-local model opensora"));
        }
        other => panic!("expected invalid graph, got {:?}", other.map(|s| s.succeeded())),
    }
}

#[test]
fn interchange_round_trip_keeps_plan() {
    let kernel = kernel();
    let graph = storyboard(&kernel, 8.0);
    let json = kernel.graphs().serialize(&graph).expect("serialize");
    let restored = kernel.graphs().deserialize(&json).expect("deserialize");

    assert_eq!(restored.id, graph.id);
    let plan = kernel.plan(&restored).expect("plan");
    assert_eq!(plan.stages, vec![vec!["plan".to_string()], vec!["clip".to_string()]]);
}
