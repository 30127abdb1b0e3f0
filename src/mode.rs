// ABOUTME: The bootstrap state machine (C4) gating all non-setup traffic
// ABOUTME: UNCONFIGURED -> LOCAL | WORKOS, monotone, never backward

use hub_core::errors::{AppError, AppResult};
use hub_core::models::system_config::AppMode;
use hub_core::models::tenancy::{User, Workspace};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::database::{system_config, tenancy};

/// Parameters needed to finish a `WORKOS` configuration or upgrade, mirroring
/// the `configure_workos`/`upgrade_to_workos` operations below.
#[derive(Debug, Clone)]
pub struct WorkosParams {
    /// The WorkOS OAuth client id.
    pub client_id: String,
    /// The WorkOS API key. Stored encrypted.
    pub api_key: String,
    /// The tenant's AuthKit domain.
    pub authkit_domain: String,
    /// Emails treated as platform super admins.
    pub super_admin_emails: Vec<String>,
}

/// Validates WorkOS credentials against the provider before they are
/// persisted. A thin seam so tests can stub provider validation without a
/// live network call.
#[async_trait::async_trait]
pub trait WorkosValidator: Send + Sync {
    /// Returns `Ok(())` if the provider accepts these credentials.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] if the provider rejects them or the
    /// validation call itself fails.
    async fn validate(&self, params: &WorkosParams) -> AppResult<()>;
}

/// The three-state bootstrap machine. Holds no state of its own beyond the
/// database handle — `SystemConfig.app_mode` is the single source of truth,
/// so the Mode Manager is cheap to construct per request.
#[derive(Clone)]
pub struct ModeManager {
    pool: Pool<Sqlite>,
}

impl ModeManager {
    /// Build a `ModeManager` over the request-serving pool.
    #[must_use]
    pub const fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// The system's current mode.
    ///
    /// # Errors
    /// Propagates any database failure.
    pub async fn current_mode(&self) -> AppResult<AppMode> {
        Ok(system_config::load_or_init(&self.pool).await?.app_mode)
    }

    /// `GET /api/setup/status` payload.
    ///
    /// # Errors
    /// Propagates any database failure.
    pub async fn status(&self) -> AppResult<(AppMode, bool)> {
        let mode = self.current_mode().await?;
        Ok((mode, mode == AppMode::Unconfigured))
    }

    /// `configure_local(admin_email)` — creates the sole Workspace and its
    /// single super-admin User, then transitions to `LOCAL`.
    ///
    /// # Errors
    /// Returns [`AppError::AlreadyConfigured`] unless the system is
    /// currently `UNCONFIGURED`.
    pub async fn configure_local(&self, admin_email: &str) -> AppResult<User> {
        let current = system_config::load_or_init(&self.pool).await?;
        if current.app_mode != AppMode::Unconfigured {
            return Err(AppError::AlreadyConfigured);
        }

        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: "Local Workspace".to_string(),
            slug: "local".to_string(),
            created_at: chrono::Utc::now(),
        };
        tenancy::create_workspace(&self.pool, &workspace).await?;

        let admin = User {
            id: Uuid::new_v4(),
            workspace_id: workspace.id,
            email: admin_email.to_string(),
            display_name: None,
            is_super_admin: true,
            created_at: chrono::Utc::now(),
            last_seen_at: None,
        };
        tenancy::create_user(&self.pool, &admin).await?;

        system_config::set(&self.pool, "local_admin_email", admin_email, false).await?;
        system_config::transition_mode(&self.pool, AppMode::Local).await?;
        Ok(admin)
    }

    /// `configure_workos(...)` — validates against the provider, then
    /// transitions `UNCONFIGURED -> WORKOS`. The sole Workspace is created
    /// lazily on first successful login, not here.
    ///
    /// # Errors
    /// Returns [`AppError::AlreadyConfigured`] unless the system is
    /// currently `UNCONFIGURED`, or propagates provider validation failure.
    pub async fn configure_workos(
        &self,
        validator: &dyn WorkosValidator,
        params: &WorkosParams,
    ) -> AppResult<()> {
        let current = system_config::load_or_init(&self.pool).await?;
        if current.app_mode != AppMode::Unconfigured {
            return Err(AppError::AlreadyConfigured);
        }
        self.persist_workos_params(validator, params).await?;
        system_config::transition_mode(&self.pool, AppMode::Workos).await?;
        Ok(())
    }

    /// `upgrade_to_workos(...)` — permitted from `LOCAL` only; atomic swap
    /// that preserves the existing Workspace. The existing local admin is
    /// *not* automatically carried into `super_admin_emails` — per
    /// `DESIGN.md`'s resolution of the open question, operators must list
    /// every super admin explicitly, including the former local admin.
    ///
    /// # Errors
    /// Returns [`AppError::AlreadyConfigured`] unless the system is
    /// currently `LOCAL`, or propagates provider validation failure.
    pub async fn upgrade_to_workos(
        &self,
        validator: &dyn WorkosValidator,
        params: &WorkosParams,
    ) -> AppResult<()> {
        let current = system_config::load_or_init(&self.pool).await?;
        if current.app_mode != AppMode::Local {
            return Err(AppError::AlreadyConfigured);
        }
        self.persist_workos_params(validator, params).await?;
        system_config::transition_mode(&self.pool, AppMode::Workos).await?;
        Ok(())
    }

    /// Reload the `WorkosParams` persisted by `configure_workos`/`upgrade_to_workos`,
    /// decrypting `api_key`. Used by the `WORKOS` authenticator at request time.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] if any required key is missing (the
    /// system is not actually in `WORKOS` mode) or malformed.
    pub async fn load_workos_params(&self) -> AppResult<WorkosParams> {
        let client_id = system_config::get(&self.pool, "workos_client_id")
            .await?
            .ok_or_else(|| AppError::Internal("workos_client_id not configured".to_string()))?
            .0;
        let authkit_domain = system_config::get(&self.pool, "workos_authkit_domain")
            .await?
            .ok_or_else(|| AppError::Internal("workos_authkit_domain not configured".to_string()))?
            .0;
        let emails_json = system_config::get(&self.pool, "workos_super_admins")
            .await?
            .ok_or_else(|| AppError::Internal("workos_super_admins not configured".to_string()))?
            .0;
        let super_admin_emails: Vec<String> = serde_json::from_str(&emails_json)?;

        let (sealed_api_key, _) = system_config::get(&self.pool, "workos_api_key")
            .await?
            .ok_or_else(|| AppError::Internal("workos_api_key not configured".to_string()))?;
        let config = system_config::load_or_init(&self.pool).await?;
        let crypto = crate::crypto::Crypto::derive(&config.encryption_salt);
        let api_key = crypto.open_from_base64(&sealed_api_key)?;

        Ok(WorkosParams {
            client_id,
            api_key,
            authkit_domain,
            super_admin_emails,
        })
    }

    async fn persist_workos_params(
        &self,
        validator: &dyn WorkosValidator,
        params: &WorkosParams,
    ) -> AppResult<()> {
        validator.validate(params).await?;

        system_config::set(&self.pool, "workos_client_id", &params.client_id, false).await?;
        system_config::set(
            &self.pool,
            "workos_authkit_domain",
            &params.authkit_domain,
            false,
        )
        .await?;
        let emails_json = serde_json::to_string(&params.super_admin_emails)?;
        system_config::set(&self.pool, "workos_super_admins", &emails_json, false).await?;

        // api_key is the one WorkOS secret this Hub persists; sealed at rest
        // under the deployment key derived from SystemConfig.encryption_salt.
        let config = system_config::load_or_init(&self.pool).await?;
        let crypto = crate::crypto::Crypto::derive(&config.encryption_salt);
        let sealed = crypto.seal_to_base64(&params.api_key)?;
        system_config::set(&self.pool, "workos_api_key", &sealed, true).await?;
        Ok(())
    }
}
