use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{Capability, NetworkAccess};

/// How a worker isolates the work it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    LocalDocker,
    RemoteApi,
    ProcessIsolation,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalDocker => write!(f, "local_docker"),
            Self::RemoteApi => write!(f, "remote_api"),
            Self::ProcessIsolation => write!(f, "process_isolation"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    #[default]
    Online,
    Busy,
    Offline,
    Draining,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Busy => write!(f, "busy"),
            Self::Offline => write!(f, "offline"),
            Self::Draining => write!(f, "draining"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResources {
    pub has_gpu: bool,
    pub max_memory_mb: u64,
    /// Isolated workers can serve `none` or `internal` network levels only.
    pub network_isolated: bool,
    pub is_local: bool,
}

/// A routable execution backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub capabilities: Vec<Capability>,
    /// Explicit list of model ids this worker can serve.
    pub supported_models: Vec<String>,
    pub execution_mode: ExecutionMode,
    pub resources: WorkerResources,
    #[serde(default)]
    pub status: WorkerStatus,
    #[serde(default)]
    pub cost_per_ms: Option<f64>,
}

impl WorkerProfile {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn serves_model(&self, model: &str) -> bool {
        self.supported_models.iter().any(|m| m == model)
    }
}

/// Worker-specific allocation issued by the router for one node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrant {
    pub gpu_allocated: bool,
    pub memory_mb: u64,
    pub network_access: NetworkAccess,
    pub timeout_ms: u64,
}

/// Closed set of routing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingError {
    NoCapabilityMatch,
    ModelNotSupported,
    NoWorkersAvailable,
    ConstraintViolationLocal,
    ConstraintViolationGpu,
    ConstraintViolationMemory,
    ConstraintViolationNetwork,
    AmbiguousRouting,
}

impl RoutingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCapabilityMatch => "NO_CAPABILITY_MATCH",
            Self::ModelNotSupported => "MODEL_NOT_SUPPORTED",
            Self::NoWorkersAvailable => "NO_WORKERS_AVAILABLE",
            Self::ConstraintViolationLocal => "CONSTRAINT_VIOLATION_LOCAL",
            Self::ConstraintViolationGpu => "CONSTRAINT_VIOLATION_GPU",
            Self::ConstraintViolationMemory => "CONSTRAINT_VIOLATION_MEMORY",
            Self::ConstraintViolationNetwork => "CONSTRAINT_VIOLATION_NETWORK",
            Self::AmbiguousRouting => "AMBIGUOUS_ROUTING",
        }
    }
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::error::Error for RoutingError {}

/// The worker chosen for a node and what it was granted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub worker_id: String,
    pub execution_mode: ExecutionMode,
    pub resource_grant: ResourceGrant,
}

/// Router output: the result plus the reasoning that produced it.
///
/// The reasoning is populated on failure as well as success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub result: std::result::Result<ResolvedTarget, RoutingError>,
    pub reasoning: Vec<String>,
}

impl RoutingDecision {
    pub fn target(&self) -> Option<&ResolvedTarget> {
        self.result.as_ref().ok()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_error_codes() {
        assert_eq!(RoutingError::NoCapabilityMatch.to_string(), "NO_CAPABILITY_MATCH");
        let json = serde_json::to_string(&RoutingError::ConstraintViolationGpu).unwrap();
        assert_eq!(json, "\"CONSTRAINT_VIOLATION_GPU\"");
    }

    #[test]
    fn worker_profile_from_json() {
        let worker: WorkerProfile = serde_json::from_value(serde_json::json!({
            "id": "w1",
            "capabilities": ["reasoning", "code_gen"],
            "supported_models": ["deepseek-r1"],
            "execution_mode": "local_docker",
            "resources": {
                "has_gpu": true,
                "max_memory_mb": 8192,
                "network_isolated": false,
                "is_local": true
            }
        }))
        .unwrap();

        assert_eq!(worker.status, WorkerStatus::Online);
        assert!(worker.supports(Capability::CodeGeneration));
        assert!(!worker.supports(Capability::VideoGeneration));
        assert!(worker.serves_model("deepseek-r1"));
    }
}
