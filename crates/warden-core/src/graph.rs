use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed category of work a node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Deep reasoning and chain-of-thought.
    Reasoning,
    /// Planning, decomposition, and task structuring.
    Planning,
    /// Video generation and refinement.
    #[serde(rename = "video_gen")]
    VideoGeneration,
    /// Visual understanding and analysis.
    VisionAnalysis,
    /// 3D scene operations and asset manipulation.
    #[serde(rename = "scene_3d")]
    Scene3d,
    /// Code generation and transformation.
    #[serde(rename = "code_gen")]
    CodeGeneration,
    /// Output verification, guardrails, and evals.
    Verification,
    /// Control flow and orchestration.
    Orchestration,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Self::Reasoning,
        Self::Planning,
        Self::VideoGeneration,
        Self::VisionAnalysis,
        Self::Scene3d,
        Self::CodeGeneration,
        Self::Verification,
        Self::Orchestration,
    ];

    /// Wire name used in the interchange format and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Planning => "planning",
            Self::VideoGeneration => "video_gen",
            Self::VisionAnalysis => "vision_analysis",
            Self::Scene3d => "scene_3d",
            Self::CodeGeneration => "code_gen",
            Self::Verification => "verification",
            Self::Orchestration => "orchestration",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| format!("unknown capability: {}", s))
    }
}

/// Sandbox network level a node may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkAccess {
    #[default]
    None,
    Internal,
    Full,
}

impl fmt::Display for NetworkAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Internal => write!(f, "internal"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// Hard requirements a node's execution environment must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConstraints {
    /// Must run on a local worker.
    #[serde(default)]
    pub local_only: bool,
    /// Timeout for one attempt.
    #[serde(default)]
    pub max_duration_ms: Option<u64>,
    #[serde(default)]
    pub requires_gpu: bool,
    /// Model whitelist. Empty means unrestricted.
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default)]
    pub network_access: NetworkAccess,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Json,
    ImagePath,
    VideoPath,
    #[serde(rename = "3d_asset_path")]
    Asset3dPath,
    CodeBlob,
}

/// A named, typed output slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSlot {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// Where a node input gets its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputBinding {
    /// A constant supplied with the graph.
    Literal { value: serde_json::Value },
    /// The named output of an upstream node.
    Reference {
        source_node_id: String,
        source_output_name: String,
    },
}

impl InputBinding {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    pub fn reference(node: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Reference {
            source_node_id: node.into(),
            source_output_name: output.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff_ms: u64,
}

/// One unit of work in the DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub name: String,
    pub capability: Capability,
    /// Specific model identifier.
    pub model: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputBinding>,
    #[serde(default)]
    pub outputs: Vec<DataSlot>,
    #[serde(default)]
    pub constraints: ExecutionConstraints,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

impl NodeSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        capability: Capability,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capability,
            model: model.into(),
            inputs: BTreeMap::new(),
            outputs: vec![],
            constraints: ExecutionConstraints::default(),
            retry_policy: None,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, binding: InputBinding) -> Self {
        self.inputs.insert(name.into(), binding);
        self
    }

    /// Bind an input to a constant value.
    pub fn with_literal(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(name.into(), InputBinding::literal(value));
        self
    }

    /// Declare an output slot.
    pub fn with_output(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.outputs.push(DataSlot {
            name: name.into(),
            data_type,
            description: None,
            required: true,
        });
        self
    }

    pub fn with_constraints(mut self, constraints: ExecutionConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.retry_policy = Some(RetryPolicy {
            max_attempts,
            backoff_ms,
        });
        self
    }

    pub fn output(&self, name: &str) -> Option<&DataSlot> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Total attempts allowed by the retry policy (at least one).
    pub fn max_attempts(&self) -> u32 {
        self.retry_policy.map(|r| r.max_attempts.max(1)).unwrap_or(1)
    }
}

/// Explicit `(from_node, from_output) -> (to_node, to_input)` connection.
///
/// Kept in lock-step with the `InputBinding::Reference` inside the target
/// node so the graph can be drawn and checked without reading node internals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from_node: String,
    pub from_output: String,
    pub to_node: String,
    pub to_input: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub estimated_cost: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphStatus {
    #[default]
    Draft,
    Validated,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for GraphStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Validated => write!(f, "validated"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The declarative DAG of work.
///
/// In memory the nodes are keyed by id. On the wire they are a sequence of
/// `[id, NodeSpec]` pairs ordered by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionGraph {
    pub id: String,
    pub intent_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(with = "node_pairs")]
    pub nodes: BTreeMap<String, NodeSpec>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub metadata: GraphMetadata,
    #[serde(default)]
    pub status: GraphStatus,
}

impl ExecutionGraph {
    pub fn new(id: impl Into<String>, intent_id: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            intent_id: intent_id.into(),
            created_at: Utc::now(),
            nodes: BTreeMap::new(),
            edges: vec![],
            metadata: GraphMetadata {
                priority,
                ..Default::default()
            },
            status: GraphStatus::Draft,
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Outcome of graph validation. Never raised; callers branch on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub cycles_detected: Vec<Vec<String>>,
}

mod node_pairs {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::NodeSpec;

    pub fn serialize<S: Serializer>(
        nodes: &BTreeMap<String, NodeSpec>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(nodes.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, NodeSpec>, D::Error> {
        let pairs: Vec<(String, NodeSpec)> = Vec::deserialize(deserializer)?;
        let mut nodes = BTreeMap::new();
        for (id, spec) in pairs {
            if id != spec.id {
                return Err(D::Error::custom(format!(
                    "node pair key {} does not match node id {}",
                    id, spec.id
                )));
            }
            if nodes.insert(id.clone(), spec).is_some() {
                return Err(D::Error::custom(format!("duplicate node id {}", id)));
            }
        }
        Ok(nodes)
    }
}
