use thiserror::Error;

use warden_core::governance::GovernanceState;
use warden_core::policy::{PolicyKind, PolicyReasonCode};
use warden_core::worker::RoutingError;

/// Why the sandbox refused a node. `Display` is the stable code recorded as
/// the node's error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxRefusal {
    #[error("EXECUTION_HALTED_BY_GOVERNANCE")]
    Halted,

    #[error("DENY_BY_DEFAULT_STATE_{0}")]
    NotExecuting(GovernanceState),

    #[error("ROUTING_FAILED_{0}")]
    Routing(RoutingError),

    #[error("FAIL_CLOSED_NON_DOCKER_TARGET")]
    NonDockerTarget,

    #[error("POLICY_{kind}_{code}")]
    Policy {
        kind: PolicyKind,
        code: PolicyReasonCode,
    },

    #[error("DURATION_EXCEEDS_{max}S_OR_INVALID")]
    Duration { max: f64 },

    #[error("PROMPT_REPETITION_REFUSED")]
    PromptRepetition,
}
