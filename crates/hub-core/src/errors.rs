// ABOUTME: Centralized error handling and error types for the Hub
// ABOUTME: Defines every error variant used across the Hub's API surface and its HTTP mapping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Hub Contributors

//! # Unified Error Handling System
//!
//! One `AppError` enum carries every error variant named in the error
//! taxonomy: component functions return typed errors, and only the front
//! door (the `http-response` feature, enabled by the main crate) translates
//! them into an HTTP status plus a `{error: {code, message, details?}}`
//! envelope. Nothing in an error payload may contain secrets, OAuth tokens,
//! or frontmatter bytes — every variant that could leak one is constructed
//! with pre-redacted fields.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of a [`AppError::ToolError`], surfaced verbatim to MCP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The child server could not be reached at all.
    Transport,
    /// The child call did not complete within its timeout.
    Timeout,
    /// The child server responded with an application-level error.
    Upstream,
    /// None of the above; details carries whatever was recoverable.
    Unknown,
}

/// Every error variant the Hub can surface, named by kind rather than by
/// the Rust type that happens to produce it.
#[derive(Debug, Error)]
pub enum AppError {
    /// A non-setup request arrived while the system is `UNCONFIGURED`.
    #[error("setup is required before this endpoint can be used")]
    SetupRequired,

    /// A setup endpoint was called against a mode that isn't `UNCONFIGURED`
    /// (or, for the upgrade endpoint, isn't `LOCAL`).
    #[error("the system is already configured")]
    AlreadyConfigured,

    /// No session, or the session/cookie has expired.
    #[error("authentication is required")]
    Unauthenticated,

    /// Authenticated, but the permission checker denied the action.
    #[error("permission denied: {reason}")]
    Forbidden {
        /// Human-readable reason, safe to return to the caller.
        reason: String,
    },

    /// `tool_name` is not present in the tool registry.
    #[error("unknown tool: {tool_name}")]
    UnknownTool {
        /// The tool name that was not found.
        tool_name: String,
    },

    /// The tool exists but is not enabled for the calling user.
    #[error("tool not activated: {tool_name}")]
    ToolNotActivated {
        /// The tool name that is not activated.
        tool_name: String,
    },

    /// `partial_config` failed JSON Schema validation.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field path → human-readable validation message.
        field_errors: HashMap<String, String>,
    },

    /// OAuth must be completed (or re-completed) before the tool can be used.
    #[error("oauth required for provider {provider}")]
    NeedsOAuth {
        /// The OAuth provider that must be authorized.
        provider: String,
        /// Scopes still required.
        scopes: Vec<String>,
        /// A ready-to-redirect-to authorize URL.
        authorize_url: String,
    },

    /// A previously valid grant no longer covers the scopes a call needs.
    #[error("reauthorization required for provider {provider}")]
    ReauthRequired {
        /// The OAuth provider that needs reauthorization.
        provider: String,
        /// Scopes still missing.
        scopes: Vec<String>,
        /// A ready-to-redirect-to authorize URL.
        authorize_url: String,
    },

    /// The authorize flow's `state` TTL elapsed before the callback arrived.
    #[error("oauth authorization state expired")]
    AuthStateExpired,

    /// A child MCP server failed to service a call.
    #[error("tool error ({kind:?}): {message}")]
    ToolError {
        /// Coarse failure category.
        kind: ToolErrorKind,
        /// Human-readable message, never containing credentials.
        message: String,
    },

    /// The DB transaction and the frontmatter file write-back disagreed and
    /// could not be fully reconciled; the caller must re-sync.
    #[error("writing the agent frontmatter file failed")]
    FrontmatterWriteFailed {
        /// Whether a background reconcile pass is still needed.
        reconcile_needed: bool,
    },

    /// Reserved for future use; not emitted by the core today.
    #[error("rate limited")]
    RateLimited,

    /// A ciphertext could not be opened (tag mismatch or corruption).
    #[error("cryptographic operation failed")]
    Crypto,

    /// A resource belonging to a different workspace was referenced.
    #[error("cross-workspace access is not permitted")]
    WorkspaceMismatch,

    /// Catch-all for infrastructure failures (DB, filesystem, serialization)
    /// that don't have a more specific variant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable error code, echoed in the JSON envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SetupRequired => "setup_required",
            Self::AlreadyConfigured => "already_configured",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden { .. } => "forbidden",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::ToolNotActivated { .. } => "tool_not_activated",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::NeedsOAuth { .. } => "needs_oauth",
            Self::ReauthRequired { .. } => "reauth_required",
            Self::AuthStateExpired => "auth_state_expired",
            Self::ToolError { .. } => "tool_error",
            Self::FrontmatterWriteFailed { .. } => "frontmatter_write_failed",
            Self::RateLimited => "rate_limited",
            Self::Crypto => "crypto_error",
            Self::WorkspaceMismatch => "workspace_mismatch",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status code this error maps to, per the error taxonomy.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::SetupRequired
            | Self::AlreadyConfigured
            | Self::NeedsOAuth { .. }
            | Self::ReauthRequired { .. } => 409,
            Self::Unauthenticated | Self::AuthStateExpired => 401,
            Self::Forbidden { .. } | Self::WorkspaceMismatch => 403,
            Self::UnknownTool { .. } | Self::ToolNotActivated { .. } => 404,
            Self::InvalidConfig { .. } => 422,
            Self::ToolError { kind, .. } => match kind {
                ToolErrorKind::Timeout => 504,
                _ => 502,
            },
            Self::FrontmatterWriteFailed { .. } | Self::Crypto | Self::Internal(_) => 500,
            Self::RateLimited => 429,
        }
    }

    /// Extra structured fields beyond `code`/`message`, if any.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidConfig { field_errors } => {
                Some(serde_json::json!({ "field_errors": field_errors }))
            }
            Self::NeedsOAuth {
                provider,
                scopes,
                authorize_url,
            }
            | Self::ReauthRequired {
                provider,
                scopes,
                authorize_url,
            } => Some(serde_json::json!({
                "provider": provider,
                "scopes": scopes,
                "authorize_url": authorize_url,
            })),
            Self::ToolError { kind, .. } => Some(serde_json::json!({ "kind": kind })),
            Self::FrontmatterWriteFailed { reconcile_needed } => {
                Some(serde_json::json!({ "reconcile_needed": reconcile_needed }))
            }
            _ => None,
        }
    }
}

/// Wire shape of every error response body: `{error: {code, message, details?}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The nested error object.
    pub error: ErrorBody,
}

/// The nested `error` object inside [`ErrorEnvelope`].
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail, shape depends on `code`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&AppError> for ErrorEnvelope {
    fn from(err: &AppError) -> Self {
        Self {
            error: ErrorBody {
                code: err.code().to_string(),
                message: err.to_string(),
                details: err.details(),
            },
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(feature = "http-response")]
mod axum_impl {
    use super::{AppError, ErrorEnvelope};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status =
                StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let envelope = ErrorEnvelope::from(&self);
            (status, Json(envelope)).into_response()
        }
    }
}

/// Convenience alias used throughout the Hub's component APIs.
pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(format!("database error: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {err}"))
    }
}
