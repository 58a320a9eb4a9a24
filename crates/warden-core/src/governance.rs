use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authoritative governance state of a running kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernanceState {
    #[default]
    Idle,
    ReviewPending,
    Approved,
    Executing,
    Paused,
    Halted,
    Completed,
    Denied,
}

impl GovernanceState {
    /// States a graph's review cycle cannot leave except by reviewing a new graph.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Halted | Self::Completed | Self::Denied)
    }
}

impl fmt::Display for GovernanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::ReviewPending => "REVIEW_PENDING",
            Self::Approved => "APPROVED",
            Self::Executing => "EXECUTING",
            Self::Paused => "PAUSED",
            Self::Halted => "HALTED",
            Self::Completed => "COMPLETED",
            Self::Denied => "DENIED",
        };
        f.write_str(s)
    }
}

/// Actor role bound to a governance engine at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Viewer,
    Operator,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Viewer => write!(f, "VIEWER"),
            Self::Operator => write!(f, "OPERATOR"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "viewer" => Ok(Self::Viewer),
            "operator" => Ok(Self::Operator),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Permissions derived purely from a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernancePermissions {
    pub can_approve: bool,
    pub can_pause: bool,
    pub can_halt: bool,
    pub can_view_sensitive_data: bool,
}

impl GovernancePermissions {
    pub fn for_role(role: UserRole) -> Self {
        let elevated = matches!(role, UserRole::Operator | UserRole::Admin);
        let admin = role == UserRole::Admin;
        Self {
            can_approve: elevated,
            can_pause: elevated,
            can_halt: admin,
            can_view_sensitive_data: admin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalKind {
    ExecutionStart,
    SensitiveAccess,
    NetworkCall,
}

/// What a review is being requested for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub kind: ApprovalKind,
    pub description: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn execution_start(description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: ApprovalKind::ExecutionStart,
            description: description.into(),
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Context tracked alongside the governance state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceContext {
    pub graph_id: Option<String>,
    pub active_node_id: Option<String>,
    pub pending_decisions: u32,
    pub security_alerts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernanceEventKind {
    StateChange,
    Decision,
    Alert,
}

/// One immutable entry of the governance audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceEvent {
    pub kind: GovernanceEventKind,
    pub from: GovernanceState,
    pub to: GovernanceState,
    pub actor: String,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_by_role() {
        let viewer = GovernancePermissions::for_role(UserRole::Viewer);
        assert!(!viewer.can_approve && !viewer.can_pause && !viewer.can_halt);

        let operator = GovernancePermissions::for_role(UserRole::Operator);
        assert!(operator.can_approve && operator.can_pause);
        assert!(!operator.can_halt && !operator.can_view_sensitive_data);

        let admin = GovernancePermissions::for_role(UserRole::Admin);
        assert!(admin.can_approve && admin.can_pause && admin.can_halt);
        assert!(admin.can_view_sensitive_data);
    }

    #[test]
    fn state_display_matches_wire() {
        let json = serde_json::to_string(&GovernanceState::ReviewPending).unwrap();
        assert_eq!(json, "\"REVIEW_PENDING\"");
        assert_eq!(GovernanceState::ReviewPending.to_string(), "REVIEW_PENDING");
    }

    #[test]
    fn role_parse() {
        assert_eq!("Admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("root".parse::<UserRole>().is_err());
    }
}
