use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::governance::GovernanceEvent;

/// Global context for one run of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub run_id: String,
    pub workspace_id: String,
    pub graph_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_replay: bool,
    /// Seed for any deterministic generation downstream.
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub dry_run: bool,
}

impl ExecutionContext {
    pub fn new(graph_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            graph_id: graph_id.into(),
            started_at: Utc::now(),
            user_id: None,
            is_replay: false,
            seed: 42,
            dry_run: false,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn as_replay(mut self) -> Self {
        self.is_replay = true;
        self
    }
}

/// Result an executor reports for one node attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub output: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl NodeExecutionResult {
    pub fn success(output: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: BTreeMap::new(),
            error: Some(error.into()),
        }
    }
}

/// Events published on the kernel event bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelEvent {
    Governance(GovernanceEvent),
    StageStarted {
        run_id: String,
        index: usize,
        nodes: Vec<String>,
    },
    NodeStarted {
        run_id: String,
        node_id: String,
        attempt: u32,
    },
    NodeCompleted {
        run_id: String,
        node_id: String,
        elapsed_ms: u64,
    },
    NodeFailed {
        run_id: String,
        node_id: String,
        error: String,
    },
    RunFinished {
        run_id: String,
        succeeded: bool,
    },
}
