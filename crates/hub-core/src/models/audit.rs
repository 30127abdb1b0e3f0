// ABOUTME: AuditEvent — the append-only audit log, insertion only
// ABOUTME: Written by identity, vault, activation, proxy, and admin routes at well-defined points

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse grouping for audit events, used for filtering in `GET /api/audit-logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// Login, logout, session, and mode-transition events.
    Auth,
    /// Tool activation, deactivation, and invocation events.
    Tool,
    /// Credential writes, OAuth issue/refresh/revoke events.
    Credential,
    /// Admin-only actions (impersonation-free in this Hub, but reserved).
    Admin,
    /// Workspace-level events (creation, membership changes).
    Workspace,
}

impl AuditCategory {
    /// Stored/serialized representation, matching the `audit_log.category` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Tool => "tool",
            Self::Credential => "credential",
            Self::Admin => "admin",
            Self::Workspace => "workspace",
        }
    }

    /// Parse from the stored column value.
    ///
    /// # Errors
    /// Returns the original string if it does not match a known category.
    pub fn parse(s: &str) -> Result<Self, &str> {
        match s {
            "auth" => Ok(Self::Auth),
            "tool" => Ok(Self::Tool),
            "credential" => Ok(Self::Credential),
            "admin" => Ok(Self::Admin),
            "workspace" => Ok(Self::Workspace),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who performed the action, as much as is known. Both fields may be `None`
/// for system-initiated events (e.g. a scheduled discovery scan).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditActor {
    /// The acting user's id, if authenticated.
    pub user_id: Option<Uuid>,
    /// The acting user's email, denormalized for readability after deletion.
    pub email: Option<String>,
}

/// What the action was performed on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTarget {
    /// Coarse resource type, e.g. `"tool"`, `"credential"`, `"agent"`.
    pub target_type: String,
    /// The resource's id, if it has one.
    pub id: Option<String>,
    /// A human-readable name for the resource.
    pub name: Option<String>,
}

/// One immutable row in the audit log. Insertion only — never updated or
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Primary key.
    pub id: Uuid,
    /// Owning workspace, if the event is workspace-scoped.
    pub workspace_id: Option<Uuid>,
    /// Who performed the action.
    pub actor: AuditActor,
    /// Coarse category, used for filtering.
    pub category: AuditCategory,
    /// Free-form action name, e.g. `"login.success"`, `"tool.activate"`.
    pub action: String,
    /// What was acted upon.
    pub target: AuditTarget,
    /// Whether the action succeeded.
    pub success: bool,
    /// Error message, present only when `success == false`. Never contains
    /// secrets, tokens, or frontmatter bytes.
    pub error_message: Option<String>,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}
