use std::collections::BTreeMap;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::graph::{Capability, ExecutionConstraints, NodeSpec};
use crate::policy::PolicyOutcome;
use crate::types::{ExecutionContext, NodeExecutionResult};

/// Execution backend. Performs (or describes) one node's unit of work.
pub trait Executor: Send + Sync + 'static {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Execute a node with its resolved inputs.
    ///
    /// A refused or failed node is an `Ok` result with `success == false`;
    /// `Err` is reserved for faults of the backend itself.
    fn execute_node<'a>(
        &'a self,
        node: &'a NodeSpec,
        inputs: BTreeMap<String, serde_json::Value>,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeExecutionResult>>;
}

/// Governance entry point consumed by workers and executors.
pub trait GovernancePort: Send + Sync {
    fn request_approval<'a>(
        &'a self,
        intent_id: &'a str,
        capability: Capability,
        model: &'a str,
        constraints: &'a ExecutionConstraints,
        context: &'a serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'a, PolicyOutcome>;
}

/// Decides whether a model id can be served locally.
pub trait ModelLocality: Send + Sync {
    fn is_local(&self, model: &str) -> bool;
}

impl<F> ModelLocality for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_local(&self, model: &str) -> bool {
        self(model)
    }
}
