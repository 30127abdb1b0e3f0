// ABOUTME: Workspace and User — the tenancy boundary and its principals
// ABOUTME: Every other workspace-scoped entity carries a workspace_id foreign key

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant boundary. Owns every `User`, `UserTool`, `ToolConfig`,
/// `Credential`, `AuditEvent`, `BaseFolder`, `Project`, and `Agent` that
/// carries its id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    /// Primary key.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Unique, URL-safe identifier.
    pub slug: String,
    /// When this workspace was created.
    pub created_at: DateTime<Utc>,
}

/// An authenticated principal within a workspace.
///
/// `(workspace_id, email)` is unique. In `LOCAL` mode exactly one `User`
/// exists, with `is_super_admin = true`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Primary key.
    pub id: Uuid,
    /// Owning workspace.
    pub workspace_id: Uuid,
    /// Unique within the workspace.
    pub email: String,
    /// Optional human-readable name.
    pub display_name: Option<String>,
    /// Platform-wide admin bypass (see `hub_core::permissions`).
    pub is_super_admin: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last time this user was seen making an authenticated request.
    pub last_seen_at: Option<DateTime<Utc>>,
}
