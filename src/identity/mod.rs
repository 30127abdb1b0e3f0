// ABOUTME: Identity (C5) — two Authenticator adapters sharing one interface
// ABOUTME: LOCAL is a single passwordless admin; WORKOS delegates to an external OIDC provider

/// The `LOCAL` adapter: single passwordless admin, every request authenticates as them.
pub mod local;
/// The `WORKOS` adapter: delegated OAuth/OIDC to an external identity provider.
pub mod workos;

use async_trait::async_trait;
use hub_core::errors::AppResult;
use uuid::Uuid;

use crate::database::session;
use sqlx::{Pool, Sqlite};

/// The authenticated actor attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// The acting user's id.
    pub user_id: Uuid,
    /// The workspace the principal operates within.
    pub workspace_id: Uuid,
    /// Platform-wide super-admin bypass.
    pub is_super_admin: bool,
    /// The principal's email address.
    pub email: String,
}

impl From<&Principal> for hub_core::permissions::Principal {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: principal.user_id,
            workspace_id: principal.workspace_id,
            is_super_admin: principal.is_super_admin,
        }
    }
}

/// Given an HTTP request's session cookie (if any), produce a [`Principal`]
/// or fail. Implemented once per app mode; the Mode Manager (C4) selects
/// which adapter is active.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate the request, optionally issuing a fresh session cookie
    /// when none was presented (as `LOCAL` does on first visit).
    ///
    /// # Errors
    /// Returns [`hub_core::errors::AppError::Unauthenticated`] if no valid
    /// session exists and this adapter cannot establish one implicitly.
    async fn authenticate(&self, session_cookie: Option<&str>) -> AppResult<AuthOutcome>;
}

/// The result of an authentication attempt: the resolved principal, plus a
/// new cookie value to set on the response when one was freshly issued.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    /// The resolved principal.
    pub principal: Principal,
    /// Set when a new session was created and the caller must emit a
    /// `Set-Cookie` header.
    pub new_session_cookie: Option<String>,
}

/// Default session lifetime for freshly issued cookies.
pub const SESSION_TTL: chrono::Duration = chrono::Duration::hours(24);

/// Mint a fresh opaque session token, persist it, and return the raw value
/// the client should receive as its cookie. Shared by both adapters so
/// session issuance/lookup/logout has one implementation.
///
/// # Errors
/// Propagates any database failure.
pub async fn issue_session(
    pool: &Pool<Sqlite>,
    user_id: Uuid,
    workspace_id: Uuid,
) -> AppResult<String> {
    let raw_token = Uuid::new_v4().to_string();
    session::create(pool, &raw_token, user_id, workspace_id, SESSION_TTL).await?;
    Ok(raw_token)
}

/// Revoke a session — `POST /api/auth/logout`. A real deletion, not a TTL
/// that merely elapses, so logout is real even under `WORKOS`.
///
/// # Errors
/// Propagates any database failure.
pub async fn revoke_session(pool: &Pool<Sqlite>, raw_token: &str) -> AppResult<()> {
    session::delete(pool, raw_token).await
}
