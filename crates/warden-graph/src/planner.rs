use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_core::error::{Result, WardenError};
use warden_core::graph::ExecutionGraph;

/// Topological order plus the parallel stages it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub ordered_nodes: Vec<String>,
    /// Each stage holds mutually independent nodes, sorted by id.
    pub stages: Vec<Vec<String>>,
}

/// Compiles a graph into stages with Kahn's algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    /// Fails instead of returning a partial order when some node can never
    /// reach zero in-degree.
    pub fn plan(&self, graph: &ExecutionGraph) -> Result<ExecutionPlan> {
        let mut in_degree: BTreeMap<&str, usize> =
            graph.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for edge in &graph.edges {
            if let Some(degree) = in_degree.get_mut(edge.to_node.as_str()) {
                *degree += 1;
            }
            successors
                .entry(edge.from_node.as_str())
                .or_default()
                .push(edge.to_node.as_str());
        }

        let mut plan = ExecutionPlan::default();
        let mut frontier: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for node in &frontier {
                for succ in successors.get(node).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(succ) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*succ);
                        }
                    }
                }
            }
            next.sort_unstable();

            plan.ordered_nodes
                .extend(frontier.iter().map(|id| id.to_string()));
            plan.stages
                .push(frontier.iter().map(|id| id.to_string()).collect());
            frontier = next;
        }

        if plan.ordered_nodes.len() != graph.len() {
            return Err(WardenError::Unschedulable {
                placed: plan.ordered_nodes.len(),
                total: graph.len(),
            });
        }

        debug!(
            graph_id = %graph.id,
            stages = plan.stages.len(),
            nodes = plan.ordered_nodes.len(),
            "Execution plan built"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use warden_core::graph::{Capability, DataType, NodeSpec, Priority};

    use super::*;
    use crate::engine::GraphEngine;

    fn graph_with(edges: &[(&str, &str)], ids: &[&str]) -> ExecutionGraph {
        let engine = GraphEngine::default();
        let mut graph = engine.create_graph("intent-1", Priority::Normal);
        for id in ids {
            let node = NodeSpec::new(*id, *id, Capability::Planning, "control-flow-v1")
                .with_output("out", DataType::Json);
            engine.add_node(&mut graph, node).unwrap();
        }
        for (i, (from, to)) in edges.iter().enumerate() {
            engine
                .connect_nodes(&mut graph, from, "out", to, &format!("in{}", i))
                .unwrap();
        }
        graph
    }

    #[test]
    fn linear_chain_is_three_stages() {
        let graph = graph_with(&[("a", "b"), ("b", "c")], &["a", "b", "c"]);
        let plan = Planner.plan(&graph).unwrap();
        assert_eq!(plan.stages, vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert_eq!(plan.ordered_nodes, vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_groups_independent_nodes() {
        let graph = graph_with(
            &[("a", "c"), ("a", "b"), ("b", "d"), ("c", "d")],
            &["a", "b", "c", "d"],
        );
        let plan = Planner.plan(&graph).unwrap();
        assert_eq!(plan.stages, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
        assert_eq!(plan.ordered_nodes.len(), graph.len());
    }

    #[test]
    fn disconnected_nodes_share_first_stage() {
        let graph = graph_with(&[], &["x", "y", "z"]);
        let plan = Planner.plan(&graph).unwrap();
        assert_eq!(plan.stages, vec![vec!["x", "y", "z"]]);
    }

    #[test]
    fn parallel_edges_between_same_nodes() {
        let graph = graph_with(&[("a", "b"), ("a", "b")], &["a", "b"]);
        let plan = Planner.plan(&graph).unwrap();
        assert_eq!(plan.stages, vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn cycle_is_unschedulable() {
        let graph = graph_with(&[("a", "b"), ("b", "c"), ("c", "b")], &["a", "b", "c"]);
        let err = Planner.plan(&graph).unwrap_err();
        assert!(matches!(
            err,
            WardenError::Unschedulable { placed: 1, total: 3 }
        ));
    }

    #[test]
    fn empty_graph_plans_empty() {
        let graph = graph_with(&[], &[]);
        let plan = Planner.plan(&graph).unwrap();
        assert!(plan.stages.is_empty());
        assert!(plan.ordered_nodes.is_empty());
    }
}
