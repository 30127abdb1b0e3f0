// ABOUTME: Pure three-tier permission evaluator with no I/O of its own
// ABOUTME: Platform admin, workspace user, and agent toolkit layers, first match wins
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Hub Contributors

//! # Permission Checker
//!
//! A pure function over already-loaded records. The caller (C11 the tool
//! proxy, or a management route) is responsible for loading the `Principal`,
//! the target resource's owner/workspace, and — for the agent-toolkit layer —
//! the `Agent`'s toolkit grants and, if `inherit_project_tools` applies, the
//! project's tool list, before calling [`PermissionChecker::check`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The action being attempted on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read a resource.
    Read,
    /// Create or modify a resource.
    Write,
    /// Remove a resource.
    Delete,
    /// Invoke a tool by name (agent-toolkit layer only).
    Invoke,
}

/// Whether a resource is private to its owning user or shared workspace-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    /// Owned by exactly one user within the workspace.
    OwnedByUser(Uuid),
    /// Visible to every member of the workspace.
    WorkspaceShared,
}

/// The authenticated actor attempting the action.
#[derive(Debug, Clone)]
pub struct Principal {
    /// The acting user's id.
    pub user_id: Uuid,
    /// The workspace the principal is operating within.
    pub workspace_id: Uuid,
    /// Platform-wide super-admin bypass.
    pub is_super_admin: bool,
}

/// The resource being acted upon.
#[derive(Debug, Clone)]
pub struct Resource {
    /// The resource's owning workspace.
    pub workspace_id: Uuid,
    /// Ownership/sharing scope within the workspace.
    pub scope: ResourceScope,
}

/// Grants carried by an `Agent`'s `hub.toolkit` frontmatter subtree, used
/// only for the agent-toolkit layer.
#[derive(Debug, Clone, Default)]
pub struct AgentToolkitGrant {
    /// Tool names explicitly listed in `hub.toolkit.tools`.
    pub tools: Vec<String>,
    /// Whether the agent additionally inherits its project's enabled tools.
    pub inherit_project_tools: bool,
}

/// The verdict returned by [`PermissionChecker::check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the action is allowed.
    pub allowed: bool,
    /// Human-readable reason, safe to surface in an audit log.
    pub reason: String,
}

impl Verdict {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Stateless three-tier permission evaluator.
pub struct PermissionChecker;

impl PermissionChecker {
    /// Evaluate whether `principal` may perform `action` on `resource`.
    ///
    /// Layers are evaluated in order, first match wins:
    /// 1. Platform admin — `is_super_admin` bypasses every other check.
    /// 2. Workspace user — same workspace, and either the resource is
    ///    user-owned by the principal (read/write/delete) or workspace-shared
    ///    (read only).
    /// 3. Falls through to denial; callers needing the agent-toolkit layer
    ///    should call [`Self::check_agent_tool_invocation`] instead for
    ///    `Action::Invoke` on a named tool.
    #[must_use]
    pub fn check(principal: &Principal, resource: &Resource, action: Action) -> Verdict {
        if principal.is_super_admin {
            return Verdict::allow("platform admin bypass");
        }

        if principal.workspace_id != resource.workspace_id {
            return Verdict::deny("resource belongs to a different workspace");
        }

        match resource.scope {
            ResourceScope::OwnedByUser(owner_id) if owner_id == principal.user_id => {
                Verdict::allow("workspace user acting on their own resource")
            }
            ResourceScope::OwnedByUser(_) => {
                Verdict::deny("workspace user resources are private to their owner")
            }
            ResourceScope::WorkspaceShared if action == Action::Read => {
                Verdict::allow("workspace-shared resource, read-only")
            }
            ResourceScope::WorkspaceShared => {
                Verdict::deny("workspace-shared resources are read-only for non-owners")
            }
        }
    }

    /// Evaluate the agent-toolkit layer: may `agent` invoke `tool_name`?
    ///
    /// `project_enabled_tools` is only consulted when
    /// `grant.inherit_project_tools` is `true`; it is the project's active
    /// tool set. Revoking a project tool immediately revokes inherited
    /// agent access — there is no grandfathering, see `DESIGN.md`.
    #[must_use]
    pub fn check_agent_tool_invocation(
        grant: &AgentToolkitGrant,
        tool_name: &str,
        project_enabled_tools: &[String],
    ) -> Verdict {
        if grant.tools.iter().any(|t| t == tool_name) {
            return Verdict::allow("tool explicitly granted in agent toolkit");
        }

        if grant.inherit_project_tools && project_enabled_tools.iter().any(|t| t == tool_name) {
            return Verdict::allow("tool inherited from project-level activation");
        }

        Verdict::deny("tool not granted to this agent")
    }
}
