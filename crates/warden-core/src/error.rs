use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    // Graph integrity errors
    #[error("Node with ID {0} already exists")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Output {output} not found on node {node}")]
    OutputNotFound { node: String, output: String },

    #[error("Graph {graph} is {status} and can no longer be modified")]
    GraphLocked { graph: String, status: String },

    #[error("Graph is invalid: {0}")]
    InvalidGraph(String),

    // Planning errors
    #[error("Cycle detected or graph structure invalid for execution ({placed} of {total} nodes schedulable)")]
    Unschedulable { placed: usize, total: usize },

    // Governance errors
    #[error("Unauthorized: {role} may not {action}")]
    Unauthorized { action: String, role: String },

    #[error("Cannot {action} in state {state}")]
    InvalidTransition { action: String, state: String },

    // Routing errors
    #[error("Worker already registered: {0}")]
    DuplicateWorker(String),

    // Runtime errors
    #[error("Upstream dependency {upstream} not ready for {node}")]
    DependencyNotReady { node: String, upstream: String },

    #[error("Node execution failed: {node}: {message}")]
    Execution { node: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;
