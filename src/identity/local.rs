// ABOUTME: The LOCAL identity adapter — single passwordless admin, no credential exchange
// ABOUTME: Every request authenticates as the sole admin; a session is still established for audit attribution

use async_trait::async_trait;
use hub_core::errors::{AppError, AppResult};
use sqlx::{Pool, Sqlite};

use super::{issue_session, AuthOutcome, Authenticator, Principal};
use crate::database::{session, tenancy};

/// No credential exchange: every request is treated as the single admin
/// user. A session cookie is still issued on first visit so audit logs can
/// attribute an actor.
pub struct LocalAuthenticator {
    pool: Pool<Sqlite>,
}

impl LocalAuthenticator {
    /// Build a `LocalAuthenticator` over the request-serving pool.
    #[must_use]
    pub const fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Authenticator for LocalAuthenticator {
    async fn authenticate(&self, session_cookie: Option<&str>) -> AppResult<AuthOutcome> {
        let workspace = tenancy::first_workspace(&self.pool)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        let admin = tenancy::get_super_admin(&self.pool, workspace.id)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        if let Some(cookie) = session_cookie {
            if let Some(existing) = session::find_valid(&self.pool, cookie).await? {
                if existing.user_id == admin.id {
                    tenancy::touch_last_seen(&self.pool, admin.id).await?;
                    return Ok(AuthOutcome {
                        principal: Principal {
                            user_id: admin.id,
                            workspace_id: workspace.id,
                            is_super_admin: true,
                            email: admin.email,
                        },
                        new_session_cookie: None,
                    });
                }
            }
        }

        let new_cookie = issue_session(&self.pool, admin.id, workspace.id).await?;
        tenancy::touch_last_seen(&self.pool, admin.id).await?;
        Ok(AuthOutcome {
            principal: Principal {
                user_id: admin.id,
                workspace_id: workspace.id,
                is_super_admin: true,
                email: admin.email,
            },
            new_session_cookie: Some(new_cookie),
        })
    }
}
