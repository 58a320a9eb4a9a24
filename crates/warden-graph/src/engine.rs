use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use warden_core::error::{Result, WardenError};
use warden_core::graph::{
    ExecutionGraph, GraphEdge, GraphStatus, InputBinding, NodeSpec, Priority, ValidationReport,
};
use warden_core::traits::ModelLocality;

use crate::locality::LocalityPolicy;

/// Builds, mutates, validates and (de)serializes execution graphs.
///
/// Mutation is only possible while a graph is `draft`.
pub struct GraphEngine {
    locality: Arc<dyn ModelLocality>,
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new(Arc::new(LocalityPolicy::default()))
    }
}

impl GraphEngine {
    pub fn new(locality: Arc<dyn ModelLocality>) -> Self {
        Self { locality }
    }

    /// An empty draft graph with a fresh id.
    pub fn create_graph(&self, intent_id: &str, priority: Priority) -> ExecutionGraph {
        let graph = ExecutionGraph::new(uuid::Uuid::new_v4().to_string(), intent_id, priority);
        debug!(graph_id = %graph.id, intent_id, "Created graph");
        graph
    }

    pub fn add_node(&self, graph: &mut ExecutionGraph, node: NodeSpec) -> Result<()> {
        ensure_draft(graph)?;
        if graph.nodes.contains_key(&node.id) {
            return Err(WardenError::DuplicateNode(node.id));
        }
        graph.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Wire `from.from_output` into `to.to_input`.
    ///
    /// Rewrites the target's input binding and the edge list together. An
    /// existing edge into the same input is replaced.
    pub fn connect_nodes(
        &self,
        graph: &mut ExecutionGraph,
        from: &str,
        from_output: &str,
        to: &str,
        to_input: &str,
    ) -> Result<()> {
        ensure_draft(graph)?;
        let source = graph
            .nodes
            .get(from)
            .ok_or_else(|| WardenError::NodeNotFound(from.to_string()))?;
        if source.output(from_output).is_none() {
            return Err(WardenError::OutputNotFound {
                node: from.to_string(),
                output: from_output.to_string(),
            });
        }
        let target = graph
            .nodes
            .get_mut(to)
            .ok_or_else(|| WardenError::NodeNotFound(to.to_string()))?;

        target
            .inputs
            .insert(to_input.to_string(), InputBinding::reference(from, from_output));
        graph
            .edges
            .retain(|e| !(e.to_node == to && e.to_input == to_input));
        graph.edges.push(GraphEdge {
            from_node: from.to_string(),
            from_output: from_output.to_string(),
            to_node: to.to_string(),
            to_input: to_input.to_string(),
        });
        debug!(graph_id = %graph.id, from, from_output, to, to_input, "Connected nodes");
        Ok(())
    }

    /// Non-mutating structural and constraint check.
    pub fn validate_graph(&self, graph: &ExecutionGraph) -> ValidationReport {
        let mut errors = Vec::new();

        let cycles = detect_cycles(graph);
        let edge_index: HashSet<(&str, &str, &str, &str)> = graph
            .edges
            .iter()
            .map(|e| {
                (
                    e.to_node.as_str(),
                    e.to_input.as_str(),
                    e.from_node.as_str(),
                    e.from_output.as_str(),
                )
            })
            .collect();
        for cycle in &cycles {
            errors.push(format!("Cycle detected: {}", cycle.join(" -> ")));
        }

        for edge in &graph.edges {
            for end in [&edge.from_node, &edge.to_node] {
                if !graph.nodes.contains_key(end) {
                    errors.push(format!(
                        "Edge {}.{} -> {}.{} references unknown node {}",
                        edge.from_node, edge.from_output, edge.to_node, edge.to_input, end
                    ));
                }
            }
            if let Some(target) = graph.nodes.get(&edge.to_node) {
                let mirrored = matches!(
                    target.inputs.get(&edge.to_input),
                    Some(InputBinding::Reference { source_node_id, source_output_name })
                        if *source_node_id == edge.from_node && *source_output_name == edge.from_output
                );
                if !mirrored {
                    errors.push(format!(
                        "Edge {}.{} -> {}.{} is not mirrored by the target input binding",
                        edge.from_node, edge.from_output, edge.to_node, edge.to_input
                    ));
                }
            }
        }

        for node in graph.nodes.values() {
            if node.constraints.local_only && !self.locality.is_local(&node.model) {
                errors.push(format!(
                    "Node {} ({}) requires local execution but uses non-local model {}.",
                    node.id, node.name, node.model
                ));
            }

            let whitelist = &node.constraints.allowed_models;
            if !whitelist.is_empty() && !whitelist.contains(&node.model) {
                errors.push(format!(
                    "Node {} uses model {} outside its allowed models",
                    node.id, node.model
                ));
            }

            for (input, binding) in &node.inputs {
                let InputBinding::Reference {
                    source_node_id,
                    source_output_name,
                } = binding
                else {
                    continue;
                };
                match graph.nodes.get(source_node_id) {
                    None => errors.push(format!(
                        "Node {} input {} references unknown node {}",
                        node.id, input, source_node_id
                    )),
                    Some(source) if source.output(source_output_name).is_none() => {
                        errors.push(format!(
                            "Node {} input {} references missing output {} on node {}",
                            node.id, input, source_output_name, source_node_id
                        ))
                    }
                    Some(_) => {}
                }
                let has_edge = edge_index.contains(&(
                    node.id.as_str(),
                    input.as_str(),
                    source_node_id.as_str(),
                    source_output_name.as_str(),
                ));
                if !has_edge {
                    errors.push(format!(
                        "Node {} input {} has no matching edge",
                        node.id, input
                    ));
                }
            }
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            cycles_detected: cycles,
        }
    }

    /// Validate and, when valid, move a draft graph to `validated`.
    pub fn mark_validated(&self, graph: &mut ExecutionGraph) -> ValidationReport {
        let report = self.validate_graph(graph);
        if report.is_valid && graph.status == GraphStatus::Draft {
            graph.status = GraphStatus::Validated;
            info!(graph_id = %graph.id, nodes = graph.len(), "Graph validated");
        }
        report
    }

    pub fn serialize(&self, graph: &ExecutionGraph) -> Result<String> {
        Ok(serde_json::to_string_pretty(graph)?)
    }

    pub fn deserialize(&self, json: &str) -> Result<ExecutionGraph> {
        Ok(serde_json::from_str(json)?)
    }

    /// Direct upstream node ids of `node_id`, in edge order.
    pub fn dependencies(&self, graph: &ExecutionGraph, node_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        graph
            .edges
            .iter()
            .filter(|e| e.to_node == node_id)
            .filter(|e| seen.insert(e.from_node.as_str()))
            .map(|e| e.from_node.clone())
            .collect()
    }
}

fn ensure_draft(graph: &ExecutionGraph) -> Result<()> {
    if graph.status == GraphStatus::Draft {
        Ok(())
    } else {
        Err(WardenError::GraphLocked {
            graph: graph.id.clone(),
            status: graph.status.to_string(),
        })
    }
}

/// Every cycle reachable by depth-first search over the edges.
///
/// The walk keeps its own frame stack, so path depth is bounded by memory
/// rather than by the thread stack.
fn detect_cycles(graph: &ExecutionGraph) -> Vec<Vec<String>> {
    let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in &graph.edges {
        successors
            .entry(edge.from_node.as_str())
            .or_default()
            .push(edge.to_node.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut cycles = Vec::new();

    for root in graph.nodes.keys() {
        let root = root.as_str();
        if !visited.insert(root) {
            continue;
        }
        on_stack.insert(root);
        // (node, index of the next successor to visit)
        let mut frames: Vec<(&str, usize)> = vec![(root, 0)];

        while let Some(frame) = frames.last_mut() {
            let (node_id, cursor) = *frame;
            let next = successors
                .get(node_id)
                .and_then(|s| s.get(cursor))
                .copied();
            let Some(next) = next else {
                frames.pop();
                on_stack.remove(node_id);
                continue;
            };
            frame.1 += 1;

            if visited.insert(next) {
                on_stack.insert(next);
                frames.push((next, 0));
            } else if on_stack.contains(next) {
                if let Some(start) = frames.iter().position(|(n, _)| *n == next) {
                    let mut cycle: Vec<String> =
                        frames[start..].iter().map(|(n, _)| n.to_string()).collect();
                    cycle.push(next.to_string());
                    cycles.push(cycle);
                }
            }
        }
    }
    cycles
}
