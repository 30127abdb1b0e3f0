// ABOUTME: ToolRegistryEntry, UserTool, ToolConfig — catalog, activation, and per-user config
// ABOUTME: The registry is populated from the filesystem at startup; activation is user-owned

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a tool authenticates to its upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// No credentials required.
    None,
    /// A single opaque API key.
    ApiKey,
    /// OAuth2 authorization-code grant.
    Oauth,
}

impl AuthType {
    /// Stored/serialized representation, matching the `tool_registry.auth_type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ApiKey => "api_key",
            Self::Oauth => "oauth",
        }
    }

    /// Parse from the stored column value.
    ///
    /// # Errors
    /// Returns the original string if it does not match a known auth type.
    pub fn parse(s: &str) -> Result<Self, &str> {
        match s {
            "none" => Ok(Self::None),
            "api_key" => Ok(Self::ApiKey),
            "oauth" => Ok(Self::Oauth),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the Hub reaches a tool's underlying server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolTransport {
    /// A handler compiled directly into the Hub binary.
    InProcess,
    /// A child process speaking newline-delimited JSON-RPC on stdin/stdout.
    Stdio {
        /// Executable to spawn.
        command: String,
        /// Arguments passed to `command`.
        #[serde(default)]
        args: Vec<String>,
    },
    /// A remote server speaking JSON-RPC over HTTP `POST`.
    Http {
        /// Endpoint the Hub posts JSON-RPC requests to.
        base_url: String,
    },
}

impl Default for ToolTransport {
    fn default() -> Self {
        Self::InProcess
    }
}

/// A catalog row describing one installable tool. Not user-editable — it is
/// rewritten wholesale on every Hub start by the Tool Registry (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistryEntry {
    /// Kebab-case primary key, e.g. `google-gmail`.
    pub tool_name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Short description shown in the catalogue.
    pub description: String,
    /// Free-form grouping used by the UI (e.g. `"communication"`).
    pub category: String,
    /// JSON Schema describing the shape of `ToolConfig` values this tool accepts.
    pub config_schema: serde_json::Value,
    /// OAuth providers this tool needs a valid grant from before it can run.
    pub required_oauth: BTreeSet<String>,
    /// How this tool authenticates.
    pub auth_type: AuthType,
    /// How the Hub reaches this tool's underlying server.
    pub transport: ToolTransport,
    /// Optional icon hint for the UI.
    pub icon: Option<String>,
    /// Set when this tool's descriptor was present in a previous scan but is
    /// missing from the current one; it is not deleted, only flagged.
    pub stale: bool,
}

/// A user's soft activation record for one tool.
///
/// At most one row exists per `(user_id, tool_name)`; deactivating sets
/// `enabled = false` rather than deleting the row, so configuration and
/// history survive a later reactivation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserTool {
    /// Primary key.
    pub id: Uuid,
    /// Owning workspace.
    pub workspace_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// References `ToolRegistryEntry::tool_name`.
    pub tool_name: String,
    /// Whether the tool is currently active for this user.
    pub enabled: bool,
    /// When this activation was first created.
    pub created_at: DateTime<Utc>,
    /// When this activation was last toggled or reconfigured.
    pub updated_at: DateTime<Utc>,
}

/// One configuration key for a `UserTool`.
///
/// `(user_tool_id, key)` is unique; every key must appear in the owning
/// tool's `config_schema`. `encrypted = true` implies the stored `value` is
/// ciphertext sealed by C1, keyed by `x-encrypted: true` in the schema.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ToolConfig {
    /// Primary key.
    pub id: Uuid,
    /// Owning `UserTool`.
    pub user_tool_id: Uuid,
    /// Configuration key, must appear in the tool's `config_schema`.
    pub key: String,
    /// The value. When `encrypted`, this is base64 ciphertext; otherwise plain JSON.
    pub value: serde_json::Value,
    /// Whether `value` is sealed ciphertext.
    pub encrypted: bool,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}
