use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use warden_core::error::{Result, WardenError};
use warden_core::event::EventBus;
use warden_core::governance::{
    ApprovalRequest, GovernanceContext, GovernanceEvent, GovernanceEventKind,
    GovernancePermissions, GovernanceState, UserRole,
};
use warden_core::types::KernelEvent;

struct Inner {
    state: GovernanceState,
    context: GovernanceContext,
    log: Vec<GovernanceEvent>,
}

/// The single authority on whether execution may proceed.
///
/// Transitions are synchronous. Each one appends exactly one event to the
/// append-only log and publishes it on the event bus before returning.
pub struct GovernanceEngine {
    role: UserRole,
    inner: RwLock<Inner>,
    event_bus: Arc<EventBus>,
}

impl GovernanceEngine {
    pub fn new(role: UserRole, event_bus: Arc<EventBus>) -> Self {
        Self {
            role,
            inner: RwLock::new(Inner {
                state: GovernanceState::Idle,
                context: GovernanceContext::default(),
                log: Vec::new(),
            }),
            event_bus,
        }
    }

    pub fn role(&self) -> UserRole {
        self.role
    }

    pub fn permissions(&self) -> GovernancePermissions {
        GovernancePermissions::for_role(self.role)
    }

    pub fn state(&self) -> GovernanceState {
        self.read().state
    }

    /// A copy of the governance context.
    pub fn context(&self) -> GovernanceContext {
        self.read().context.clone()
    }

    /// A copy of the audit log, oldest first.
    pub fn events(&self) -> Vec<GovernanceEvent> {
        self.read().log.clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<KernelEvent> {
        self.event_bus.subscribe()
    }

    /// Put a graph under review.
    ///
    /// Legal from `IDLE` and `PAUSED`, and from a terminal state when the
    /// request names a different graph than the one last reviewed.
    pub fn request_review(&self, graph_id: &str, request: ApprovalRequest) -> Result<()> {
        let mut inner = self.write();
        let fresh_cycle = inner.state.is_terminal()
            && inner.context.graph_id.as_deref() != Some(graph_id);
        let legal = matches!(inner.state, GovernanceState::Idle | GovernanceState::Paused);
        if !legal && !fresh_cycle {
            return Err(invalid("request review", inner.state));
        }

        if fresh_cycle {
            inner.context.active_node_id = None;
            inner.context.pending_decisions = 0;
        }
        inner.context.graph_id = Some(graph_id.to_string());
        inner.context.pending_decisions += 1;

        let detail = json!({ "graph_id": graph_id, "request": request });
        self.transition(
            &mut inner,
            GovernanceEventKind::StateChange,
            GovernanceState::ReviewPending,
            "SYSTEM",
            detail,
        );
        Ok(())
    }

    pub fn approve(&self, actor: &str, notes: &str) -> Result<()> {
        self.require(self.permissions().can_approve, "approve")?;
        let mut inner = self.write();
        if !matches!(
            inner.state,
            GovernanceState::ReviewPending | GovernanceState::Paused
        ) {
            return Err(invalid("approve", inner.state));
        }

        inner.context.pending_decisions = inner.context.pending_decisions.saturating_sub(1);
        let detail = json!({ "decision": "APPROVED", "notes": notes });
        self.transition(
            &mut inner,
            GovernanceEventKind::Decision,
            GovernanceState::Approved,
            actor,
            detail,
        );
        Ok(())
    }

    pub fn deny(&self, actor: &str, reason: &str) -> Result<()> {
        self.require(self.permissions().can_approve, "deny")?;
        let mut inner = self.write();
        if !matches!(
            inner.state,
            GovernanceState::ReviewPending | GovernanceState::Paused
        ) {
            return Err(invalid("deny", inner.state));
        }

        inner.context.pending_decisions = inner.context.pending_decisions.saturating_sub(1);
        let detail = json!({ "decision": "DENIED", "reason": reason });
        self.transition(
            &mut inner,
            GovernanceEventKind::Decision,
            GovernanceState::Denied,
            actor,
            detail,
        );
        Ok(())
    }

    pub fn start_execution(&self, actor: &str) -> Result<()> {
        let mut inner = self.write();
        if inner.state != GovernanceState::Approved {
            return Err(invalid("start execution", inner.state));
        }
        self.transition(
            &mut inner,
            GovernanceEventKind::StateChange,
            GovernanceState::Executing,
            actor,
            serde_json::Value::Null,
        );
        Ok(())
    }

    /// Pause a running execution. A no-op unless the state is `EXECUTING`.
    pub fn pause(&self, actor: &str) -> Result<()> {
        self.require(self.permissions().can_pause, "pause")?;
        let mut inner = self.write();
        if inner.state != GovernanceState::Executing {
            return Ok(());
        }
        self.transition(
            &mut inner,
            GovernanceEventKind::StateChange,
            GovernanceState::Paused,
            actor,
            serde_json::Value::Null,
        );
        Ok(())
    }

    pub fn resume(&self, actor: &str) -> Result<()> {
        self.require(self.permissions().can_pause, "resume")?;
        let mut inner = self.write();
        if inner.state != GovernanceState::Paused {
            return Err(invalid("resume", inner.state));
        }
        self.transition(
            &mut inner,
            GovernanceEventKind::StateChange,
            GovernanceState::Executing,
            actor,
            serde_json::Value::Null,
        );
        Ok(())
    }

    /// Kill switch. Admin only, reachable from every state.
    pub fn halt(&self, actor: &str, reason: &str) -> Result<()> {
        self.require(self.permissions().can_halt, "halt")?;
        let mut inner = self.write();
        warn!(actor, reason, from = %inner.state, "Governance kill switch activated");
        inner.context.security_alerts.push(reason.to_string());
        let detail = json!({ "alert": "KILL_SWITCH_ACTIVATED", "reason": reason });
        self.transition(
            &mut inner,
            GovernanceEventKind::Alert,
            GovernanceState::Halted,
            actor,
            detail,
        );
        Ok(())
    }

    /// Mark a running execution as finished.
    pub fn complete(&self, actor: &str) -> Result<()> {
        let mut inner = self.write();
        if inner.state != GovernanceState::Executing {
            return Err(invalid("complete", inner.state));
        }
        inner.context.active_node_id = None;
        self.transition(
            &mut inner,
            GovernanceEventKind::StateChange,
            GovernanceState::Completed,
            actor,
            serde_json::Value::Null,
        );
        Ok(())
    }

    /// Record which node is currently executing. Context only; no event.
    pub fn set_active_node(&self, node_id: Option<&str>) {
        self.write().context.active_node_id = node_id.map(str::to_string);
    }

    fn require(&self, allowed: bool, action: &str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(WardenError::Unauthorized {
                action: action.to_string(),
                role: self.role.to_string(),
            })
        }
    }

    fn transition(
        &self,
        inner: &mut Inner,
        kind: GovernanceEventKind,
        to: GovernanceState,
        actor: &str,
        detail: serde_json::Value,
    ) {
        let from = inner.state;
        inner.state = to;

        let event = GovernanceEvent {
            kind,
            from,
            to,
            actor: actor.to_string(),
            detail,
            timestamp: Utc::now(),
        };
        inner.log.push(event.clone());

        info!(%from, %to, actor, "Governance transition");
        self.event_bus.publish(KernelEvent::Governance(event));
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn invalid(action: &str, state: GovernanceState) -> WardenError {
    WardenError::InvalidTransition {
        action: action.to_string(),
        state: state.to_string(),
    }
}
