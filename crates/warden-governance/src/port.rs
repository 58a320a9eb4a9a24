use futures::future::BoxFuture;
use tracing::debug;

use warden_core::governance::GovernanceState;
use warden_core::graph::{Capability, ExecutionConstraints, NetworkAccess};
use warden_core::policy::{PolicyOutcome, PolicyReasonCode};
use warden_core::traits::GovernancePort;

use crate::engine::GovernanceEngine;

impl GovernanceEngine {
    /// Synchronous policy verdict for one unit of work.
    pub fn evaluate(
        &self,
        intent_id: &str,
        capability: Capability,
        model: &str,
        constraints: &ExecutionConstraints,
    ) -> PolicyOutcome {
        let outcome = match self.state() {
            GovernanceState::Executing => check_constraints(model, constraints),
            GovernanceState::Halted => PolicyOutcome::halt(
                PolicyReasonCode::GovernanceLock,
                "governance kill switch is engaged",
            ),
            GovernanceState::ReviewPending => {
                PolicyOutcome::require_consent("graph is awaiting review")
            }
            other => PolicyOutcome::deny(
                PolicyReasonCode::GovernanceLock,
                format!("execution not permitted in state {}", other),
            ),
        };
        debug!(intent_id, %capability, model, outcome = %outcome, "Policy evaluated");
        outcome
    }
}

fn check_constraints(model: &str, constraints: &ExecutionConstraints) -> PolicyOutcome {
    if !constraints.allowed_models.is_empty()
        && !constraints.allowed_models.iter().any(|m| m == model)
    {
        return PolicyOutcome::deny(
            PolicyReasonCode::MissingPermission,
            format!("model {} is not whitelisted for this node", model),
        );
    }
    if constraints.local_only && constraints.network_access == NetworkAccess::Full {
        return PolicyOutcome::deny(
            PolicyReasonCode::InvalidIsolation,
            "local-only work cannot be granted full network access",
        );
    }
    PolicyOutcome::allow("within governance policy")
}

impl GovernancePort for GovernanceEngine {
    fn request_approval<'a>(
        &'a self,
        intent_id: &'a str,
        capability: Capability,
        model: &'a str,
        constraints: &'a ExecutionConstraints,
        _context: &'a serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'a, PolicyOutcome> {
        Box::pin(async move { self.evaluate(intent_id, capability, model, constraints) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warden_core::event::EventBus;
    use warden_core::governance::{ApprovalRequest, UserRole};
    use warden_core::policy::PolicyKind;

    use super::*;

    fn executing() -> GovernanceEngine {
        let engine = GovernanceEngine::new(UserRole::Admin, Arc::new(EventBus::default()));
        engine
            .request_review("g1", ApprovalRequest::execution_start("run"))
            .unwrap();
        engine.approve("admin", "ok").unwrap();
        engine.start_execution("admin").unwrap();
        engine
    }

    async fn ask(engine: &GovernanceEngine, model: &str, c: &ExecutionConstraints) -> PolicyOutcome {
        let ctx = serde_json::Map::new();
        engine
            .request_approval("intent-1", Capability::Reasoning, model, c, &ctx)
            .await
    }

    #[tokio::test]
    async fn allow_while_executing() {
        let engine = executing();
        let outcome = ask(&engine, "deepseek-r1", &ExecutionConstraints::default()).await;
        assert!(outcome.is_allowed());
        assert_eq!(outcome.code(), PolicyReasonCode::Ok);
    }

    #[tokio::test]
    async fn state_driven_outcomes() {
        let idle = GovernanceEngine::new(UserRole::Admin, Arc::new(EventBus::default()));
        let c = ExecutionConstraints::default();
        let outcome = ask(&idle, "m", &c).await;
        assert_eq!(outcome.kind(), PolicyKind::Deny);
        assert_eq!(outcome.code(), PolicyReasonCode::GovernanceLock);

        idle.request_review("g1", ApprovalRequest::execution_start("run"))
            .unwrap();
        let outcome = ask(&idle, "m", &c).await;
        assert_eq!(outcome.kind(), PolicyKind::RequireConsent);
        assert_eq!(outcome.code(), PolicyReasonCode::ExplicitConsentRequired);

        idle.halt("admin", "stop").unwrap();
        let outcome = ask(&idle, "m", &c).await;
        assert_eq!(outcome.kind(), PolicyKind::Halt);
        assert_eq!(outcome.code(), PolicyReasonCode::GovernanceLock);
    }

    #[tokio::test]
    async fn whitelist_and_isolation() {
        let engine = executing();
        let whitelist = ExecutionConstraints {
            allowed_models: vec!["llava".into()],
            ..Default::default()
        };
        let outcome = ask(&engine, "gpt-4o", &whitelist).await;
        assert_eq!(outcome.code(), PolicyReasonCode::MissingPermission);
        assert!(ask(&engine, "llava", &whitelist).await.is_allowed());

        let leaky = ExecutionConstraints {
            local_only: true,
            network_access: NetworkAccess::Full,
            ..Default::default()
        };
        let outcome = ask(&engine, "local-llm", &leaky).await;
        assert_eq!(outcome.kind(), PolicyKind::Deny);
        assert_eq!(outcome.code(), PolicyReasonCode::InvalidIsolation);
    }
}
