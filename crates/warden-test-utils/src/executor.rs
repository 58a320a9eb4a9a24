use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use futures::future::BoxFuture;

use warden_core::error::{Result, WardenError};
use warden_core::graph::NodeSpec;
use warden_core::traits::Executor;
use warden_core::types::{ExecutionContext, NodeExecutionResult};

/// Executor with scripted outcomes that records every call.
///
/// A successful node sets each declared output to `"<id>(<inputs>)"`, so a
/// downstream value shows the whole chain it was derived from.
#[derive(Default)]
pub struct ScriptedExecutor {
    fail_on: HashSet<String>,
    error_on: HashSet<String>,
    flaky: HashMap<String, u32>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report failure for this node on every attempt.
    pub fn fail_on(mut self, node_id: &str) -> Self {
        self.fail_on.insert(node_id.to_string());
        self
    }

    /// Return a backend error for this node.
    pub fn error_on(mut self, node_id: &str) -> Self {
        self.error_on.insert(node_id.to_string());
        self
    }

    /// Fail the first `failures` attempts of this node, then succeed.
    pub fn flaky(mut self, node_id: &str, failures: u32) -> Self {
        self.flaky.insert(node_id.to_string(), failures);
        self
    }

    /// Node ids in call order, one entry per attempt.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn attempts(&self, node_id: &str) -> usize {
        self.calls().iter().filter(|id| *id == node_id).count()
    }

    fn derive(node: &NodeSpec, inputs: &BTreeMap<String, serde_json::Value>) -> NodeExecutionResult {
        let args: Vec<String> = inputs
            .values()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let value = serde_json::Value::String(format!("{}({})", node.id, args.join(",")));
        let output = node
            .outputs
            .iter()
            .map(|slot| (slot.name.clone(), value.clone()))
            .collect();
        NodeExecutionResult::success(output)
    }
}

impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn execute_node<'a>(
        &'a self,
        node: &'a NodeSpec,
        inputs: BTreeMap<String, serde_json::Value>,
        _ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeExecutionResult>> {
        Box::pin(async move {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(node.id.clone());
                calls.iter().filter(|id| **id == node.id).count() as u32
            };

            if self.error_on.contains(&node.id) {
                return Err(WardenError::Execution {
                    node: node.id.clone(),
                    message: "scripted backend error".into(),
                });
            }
            if self.fail_on.contains(&node.id) {
                return Ok(NodeExecutionResult::failure("scripted failure"));
            }
            if let Some(failures) = self.flaky.get(&node.id) {
                if attempt <= *failures {
                    return Ok(NodeExecutionResult::failure(format!(
                        "transient failure on attempt {}",
                        attempt
                    )));
                }
            }
            Ok(Self::derive(node, &inputs))
        })
    }
}
