use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::graph::{ExecutionGraph, GraphStatus};
use warden_core::types::ExecutionContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Execution record for one node.
///
/// A finished node carries either `output` or `error`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRuntimeState {
    pub node_id: String,
    pub status: NodeStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub output: Option<BTreeMap<String, serde_json::Value>>,
    pub error: Option<String>,
    pub logs: Vec<String>,
}

impl NodeRuntimeState {
    pub fn pending(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeStatus::Pending,
            attempts: 0,
            started_at: None,
            ended_at: None,
            output: None,
            error: None,
            logs: vec![],
        }
    }

    pub(crate) fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }
}

/// Everything one run knows about its nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub context: ExecutionContext,
    pub node_states: BTreeMap<String, NodeRuntimeState>,
    /// Lifecycle status of the graph this run executes.
    #[serde(default)]
    pub graph_status: GraphStatus,
    /// Run-wide scratch data.
    #[serde(default)]
    pub shared: serde_json::Map<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionSnapshot {
    /// One pending state per graph node.
    pub fn new(graph: &ExecutionGraph, context: ExecutionContext) -> Self {
        Self {
            context,
            node_states: graph
                .nodes
                .keys()
                .map(|id| (id.clone(), NodeRuntimeState::pending(id.clone())))
                .collect(),
            graph_status: graph.status,
            shared: serde_json::Map::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeRuntimeState> {
        self.node_states.get(id)
    }

    /// True when every node completed.
    pub fn succeeded(&self) -> bool {
        self.node_states
            .values()
            .all(|s| s.status == NodeStatus::Completed)
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.node_states
            .values()
            .filter(|s| s.status == status)
            .count()
    }

    /// Per-status counts, for summaries.
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for state in self.node_states.values() {
            *counts.entry(state.status.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use warden_core::graph::{Capability, NodeSpec, Priority};

    use super::*;

    #[test]
    fn new_snapshot_is_all_pending() {
        let mut graph = ExecutionGraph::new("g1", "intent", Priority::Normal);
        for id in ["a", "b"] {
            graph
                .nodes
                .insert(id.into(), NodeSpec::new(id, id, Capability::Planning, "m"));
        }
        let snapshot = ExecutionSnapshot::new(&graph, ExecutionContext::new("g1", "ws"));
        assert_eq!(snapshot.count(NodeStatus::Pending), 2);
        assert!(!snapshot.succeeded());
        assert_eq!(snapshot.status_counts()["pending"], 2);
        assert_eq!(snapshot.node("a").unwrap().attempts, 0);
    }

    #[test]
    fn empty_graph_counts_as_success() {
        let graph = ExecutionGraph::new("g1", "intent", Priority::Normal);
        let snapshot = ExecutionSnapshot::new(&graph, ExecutionContext::new("g1", "ws"));
        assert!(snapshot.succeeded());
    }

    #[test]
    fn terminal_statuses() {
        assert!(NodeStatus::Failed.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert_eq!(serde_json::to_string(&NodeStatus::Ready).unwrap(), "\"ready\"");
    }
}
