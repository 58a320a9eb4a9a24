use std::path::PathBuf;

use warden_core::graph::{
    Capability, DataType, ExecutionConstraints, ExecutionGraph, GraphEdge, InputBinding, NodeSpec,
    Priority,
};

/// Wire `from.output -> to.input` on both the binding and the edge list.
///
/// Panics if `to` is missing; fixtures are expected to be well formed.
pub fn connect(graph: &mut ExecutionGraph, from: &str, output: &str, to: &str, input: &str) {
    let target = graph.nodes.get_mut(to).expect("fixture target node");
    target
        .inputs
        .insert(input.to_string(), InputBinding::reference(from, output));
    graph.edges.push(GraphEdge {
        from_node: from.to_string(),
        from_output: output.to_string(),
        to_node: to.to_string(),
        to_input: input.to_string(),
    });
}

/// `a -> b -> c`: `a` takes the literal `seed = "hello"` and produces `x`,
/// `b` consumes `x` producing `y`, `c` consumes `y` producing `z`.
pub fn linear_graph() -> ExecutionGraph {
    let mut graph = ExecutionGraph::new("graph-linear", "intent-linear", Priority::Normal);
    let a = NodeSpec::new("a", "Seed", Capability::Planning, "deepseek-r1")
        .with_literal("seed", "hello")
        .with_output("x", DataType::Text);
    let b = NodeSpec::new("b", "Expand", Capability::Reasoning, "deepseek-r1")
        .with_output("y", DataType::Text);
    let c = NodeSpec::new("c", "Finish", Capability::CodeGeneration, "deepseek-coder")
        .with_output("z", DataType::Text);
    for node in [a, b, c] {
        graph.nodes.insert(node.id.clone(), node);
    }
    connect(&mut graph, "a", "x", "b", "x");
    connect(&mut graph, "b", "y", "c", "y");
    graph
}

/// A local video-generation node with literal duration and prompt inputs.
pub fn video_node(id: &str, duration_secs: f64, prompt: &str) -> NodeSpec {
    NodeSpec::new(id, "Render clip", Capability::VideoGeneration, "stable-video-diffusion")
        .with_literal("durationSecs", duration_secs)
        .with_literal("prompt", prompt)
        .with_output("video", DataType::VideoPath)
        .with_constraints(ExecutionConstraints {
            local_only: true,
            requires_gpu: true,
            ..Default::default()
        })
}

/// Write a TOML config into a fresh temp dir. Keep the dir alive while the
/// path is in use.
pub fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("warden.toml");
    std::fs::write(&path, content).expect("write config");
    (dir, path)
}
