use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use tracing::warn;

use warden_core::config::CapabilityGuardrail;
use warden_core::graph::NodeSpec;
use warden_core::types::ExecutionContext;

use crate::refusal::SandboxRefusal;

/// Declarative per-capability guardrails, shared by any executor.
///
/// The prompt ledger is keyed by `graph_id:node_id`, so repetition is
/// detected across attempts of one node but never across graphs.
pub struct Guardrails {
    rails: Vec<CapabilityGuardrail>,
    seen_prompts: Mutex<HashMap<String, HashSet<String>>>,
}

impl Guardrails {
    pub fn new(rails: Vec<CapabilityGuardrail>) -> Self {
        Self {
            rails,
            seen_prompts: Mutex::new(HashMap::new()),
        }
    }

    /// Check a node's resolved inputs. A passing prompt is recorded,
    /// except on dry runs, which only consult the ledger.
    pub fn check(
        &self,
        node: &NodeSpec,
        inputs: &BTreeMap<String, serde_json::Value>,
        ctx: &ExecutionContext,
    ) -> Result<(), SandboxRefusal> {
        let Some(rail) = self.rails.iter().find(|r| r.capability == node.capability) else {
            return Ok(());
        };

        if let Some(max) = rail.max_duration_secs {
            let duration = inputs.get(&rail.duration_input).and_then(as_number);
            match duration {
                Some(d) if d > 0.0 && d <= max => {}
                _ => {
                    warn!(node_id = %node.id, ?duration, max, "Duration guardrail tripped");
                    return Err(SandboxRefusal::Duration { max });
                }
            }
        }

        if rail.forbid_prompt_repetition {
            let prompt = inputs
                .get(&rail.prompt_input)
                .map(|v| match v {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            if !prompt.is_empty() {
                let key = format!("{}:{}", ctx.graph_id, node.id);
                let mut seen = self.seen_prompts.lock().unwrap_or_else(|e| e.into_inner());
                let repeated = if ctx.dry_run {
                    seen.get(&key).is_some_and(|prompts| prompts.contains(&prompt))
                } else {
                    !seen.entry(key).or_default().insert(prompt)
                };
                if repeated {
                    warn!(node_id = %node.id, "Prompt repetition refused");
                    return Err(SandboxRefusal::PromptRepetition);
                }
            }
        }
        Ok(())
    }
}

/// Numbers, or strings holding a number.
fn as_number(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use warden_core::config::KernelConfig;
    use warden_core::graph::Capability;
    use warden_test_utils::video_node;

    use super::*;

    fn rails() -> Guardrails {
        Guardrails::new(KernelConfig::default().guardrails)
    }

    fn inputs(duration: serde_json::Value, prompt: &str) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([
            ("durationSecs".to_string(), duration),
            ("prompt".to_string(), json!(prompt)),
        ])
    }

    #[test]
    fn duration_bounds() {
        let g = rails();
        let node = video_node("v1", 8.0, "unused");
        let ctx = ExecutionContext::new("g1", "ws");

        assert!(g.check(&node, &inputs(json!(12), "a"), &ctx).is_ok());
        assert!(g.check(&node, &inputs(json!("4.5"), "b"), &ctx).is_ok());
        for bad in [json!(0), json!(-1), json!(12.01), json!(15), json!("soon"), json!(null)] {
            assert_eq!(
                g.check(&node, &inputs(bad, "c"), &ctx),
                Err(SandboxRefusal::Duration { max: 12.0 })
            );
        }

        let missing = BTreeMap::from([("prompt".to_string(), json!("d"))]);
        assert!(g.check(&node, &missing, &ctx).is_err());
    }

    #[test]
    fn prompt_repetition_scoped_by_graph_and_node() {
        let g = rails();
        let node = video_node("v1", 8.0, "unused");
        let ctx = ExecutionContext::new("g1", "ws");

        assert!(g.check(&node, &inputs(json!(8), "a sunset"), &ctx).is_ok());
        assert_eq!(
            g.check(&node, &inputs(json!(8), "  a sunset "), &ctx),
            Err(SandboxRefusal::PromptRepetition)
        );

        let other_node = video_node("v2", 8.0, "unused");
        assert!(g.check(&other_node, &inputs(json!(8), "a sunset"), &ctx).is_ok());

        let other_graph = ExecutionContext::new("g2", "ws");
        assert!(g.check(&node, &inputs(json!(8), "a sunset"), &other_graph).is_ok());
    }

    #[test]
    fn dry_run_leaves_prompt_ledger_untouched() {
        let g = rails();
        let node = video_node("v1", 8.0, "unused");
        let dry = ExecutionContext::new("g1", "ws").with_dry_run(true);

        assert!(g.check(&node, &inputs(json!(8), "a harbor"), &dry).is_ok());
        assert!(g.check(&node, &inputs(json!(8), "a harbor"), &dry).is_ok());

        let live = ExecutionContext::new("g1", "ws");
        assert!(g.check(&node, &inputs(json!(8), "a harbor"), &live).is_ok());
        assert_eq!(
            g.check(&node, &inputs(json!(8), "a harbor"), &dry),
            Err(SandboxRefusal::PromptRepetition)
        );
    }

    #[test]
    fn empty_prompt_never_recorded() {
        let g = rails();
        let node = video_node("v1", 8.0, "");
        let ctx = ExecutionContext::new("g1", "ws");
        assert!(g.check(&node, &inputs(json!(8), ""), &ctx).is_ok());
        assert!(g.check(&node, &inputs(json!(8), ""), &ctx).is_ok());
    }

    #[test]
    fn unguarded_capability_passes() {
        let g = rails();
        let node = NodeSpec::new("r1", "Think", Capability::Reasoning, "deepseek-r1");
        let ctx = ExecutionContext::new("g1", "ws");
        assert!(g.check(&node, &BTreeMap::new(), &ctx).is_ok());
    }
}
