use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyKind {
    Allow,
    Deny,
    Halt,
    RequireConsent,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::Deny => write!(f, "DENY"),
            Self::Halt => write!(f, "HALT"),
            Self::RequireConsent => write!(f, "REQUIRE_CONSENT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyReasonCode {
    Ok,
    GovernanceLock,
    ExplicitConsentRequired,
    ProviderNotFound,
    InvalidIsolation,
    MissingPermission,
}

impl fmt::Display for PolicyReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::GovernanceLock => write!(f, "GOVERNANCE_LOCK"),
            Self::ExplicitConsentRequired => write!(f, "EXPLICIT_CONSENT_REQUIRED"),
            Self::ProviderNotFound => write!(f, "PROVIDER_NOT_FOUND"),
            Self::InvalidIsolation => write!(f, "INVALID_ISOLATION"),
            Self::MissingPermission => write!(f, "MISSING_PERMISSION"),
        }
    }
}

/// A governance verdict. Fields are private so an issued outcome cannot change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    kind: PolicyKind,
    code: PolicyReasonCode,
    reason: String,
}

impl PolicyOutcome {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            kind: PolicyKind::Allow,
            code: PolicyReasonCode::Ok,
            reason: reason.into(),
        }
    }

    pub fn deny(code: PolicyReasonCode, reason: impl Into<String>) -> Self {
        Self {
            kind: PolicyKind::Deny,
            code,
            reason: reason.into(),
        }
    }

    pub fn halt(code: PolicyReasonCode, reason: impl Into<String>) -> Self {
        Self {
            kind: PolicyKind::Halt,
            code,
            reason: reason.into(),
        }
    }

    pub fn require_consent(reason: impl Into<String>) -> Self {
        Self {
            kind: PolicyKind::RequireConsent,
            code: PolicyReasonCode::ExplicitConsentRequired,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    pub fn code(&self) -> PolicyReasonCode {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_allowed(&self) -> bool {
        self.kind == PolicyKind::Allow
    }
}

impl fmt::Display for PolicyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.code, self.reason)
    }
}
