// ABOUTME: The WORKOS identity adapter — delegated OAuth2/PKCE login via AuthKit
// ABOUTME: Provider exchange is behind a trait so the flow is testable without a live network call

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hub_core::errors::{AppError, AppResult};
use hub_core::models::tenancy::{User, Workspace};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use super::{issue_session, AuthOutcome, Authenticator, Principal};
use crate::database::{session, tenancy};
use crate::mode::ModeManager;
use crate::oauth_state::OAuthStateStore;

/// PKCE verifier + the redirect target the caller should resume to, bound to
/// an authorize-flow `state` for the duration of the round trip.
#[derive(Debug, Clone)]
struct PendingLogin {
    code_verifier: String,
}

/// The profile WorkOS returns alongside tokens from a successful code
/// exchange. AuthKit's `authenticate` response embeds the user profile
/// directly — there is no separate id_token to validate.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkosProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkosTokenResponse {
    pub user: WorkosProfile,
}

/// Talks to WorkOS. A thin seam so tests can stub the network call, mirroring
/// how `ModeManager` takes a `WorkosValidator` trait object rather than
/// reaching for a concrete HTTP client directly.
#[async_trait]
pub trait WorkosProvider: Send + Sync {
    /// Build the `https://<authkit_domain>/oauth/authorize` URL the browser
    /// should be redirected to.
    fn authorize_url(
        &self,
        client_id: &str,
        authkit_domain: &str,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> String;

    /// Exchange an authorization `code` for the authenticated user's profile.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] if the exchange fails or WorkOS rejects
    /// the code.
    async fn exchange_code(
        &self,
        client_id: &str,
        api_key: &str,
        code: &str,
        code_verifier: &str,
    ) -> AppResult<WorkosTokenResponse>;
}

/// The real provider, talking to WorkOS's User Management API.
pub struct RealWorkosProvider {
    http: reqwest::Client,
}

impl RealWorkosProvider {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Default for RealWorkosProvider {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl WorkosProvider for RealWorkosProvider {
    fn authorize_url(
        &self,
        client_id: &str,
        authkit_domain: &str,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> String {
        format!(
            "https://{authkit_domain}/oauth/authorize?response_type=code&client_id={client_id}\
             &redirect_uri={redirect_uri}&state={state}&code_challenge={code_challenge}\
             &code_challenge_method=S256&provider=authkit",
            client_id = urlencoding::encode(client_id),
            redirect_uri = urlencoding::encode(redirect_uri),
            state = urlencoding::encode(state),
            code_challenge = urlencoding::encode(code_challenge),
        )
    }

    async fn exchange_code(
        &self,
        client_id: &str,
        api_key: &str,
        code: &str,
        code_verifier: &str,
    ) -> AppResult<WorkosTokenResponse> {
        let response = self
            .http
            .post("https://api.workos.com/user_management/authenticate")
            .json(&serde_json::json!({
                "client_id": client_id,
                "client_secret": api_key,
                "grant_type": "authorization_code",
                "code": code,
                "code_verifier": code_verifier,
            }))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("workos exchange request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "workos rejected the authorization code: {}",
                response.status()
            )));
        }

        response
            .json::<WorkosTokenResponse>()
            .await
            .map_err(|e| AppError::Internal(format!("malformed workos response: {e}")))
    }
}

/// Validates a `WorkosParams` set by calling an authenticated WorkOS
/// endpoint before persisting anything — a typo'd `api_key` fails setup
/// loudly instead of surfacing as an opaque 401 on the first real login.
pub struct WorkosCredentialValidator {
    http: reqwest::Client,
}

impl WorkosCredentialValidator {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Default for WorkosCredentialValidator {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl crate::mode::WorkosValidator for WorkosCredentialValidator {
    async fn validate(&self, params: &crate::mode::WorkosParams) -> AppResult<()> {
        if params.client_id.trim().is_empty() || params.authkit_domain.trim().is_empty() {
            return Err(AppError::Internal("client_id and authkit_domain are required".to_string()));
        }

        let response = self
            .http
            .get("https://api.workos.com/user_management/users")
            .query(&[("limit", "1")])
            .bearer_auth(&params.api_key)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("workos validation request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "workos rejected the supplied api_key: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Generate a PKCE `(verifier, S256 challenge)` pair, matching the teacher's
/// `oauth2_client::PkceParams` shape.
fn generate_pkce() -> (String, String) {
    let verifier: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    let digest = Sha256::digest(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(digest);
    (verifier, challenge)
}

/// Delegated OAuth2/PKCE login against WorkOS AuthKit. Every successful
/// callback either finds the existing `(workspace_id, email)` User or
/// provisions a new one under the deployment's sole Workspace.
pub struct WorkosAuthenticator<P: WorkosProvider> {
    pool: Pool<Sqlite>,
    provider: P,
    pending: OAuthStateStore<PendingLogin>,
}

impl<P: WorkosProvider> WorkosAuthenticator<P> {
    /// Build a `WorkosAuthenticator` over the request-serving pool.
    #[must_use]
    pub fn new(pool: Pool<Sqlite>, provider: P) -> Self {
        Self {
            pool,
            provider,
            pending: OAuthStateStore::new(),
        }
    }

    /// `GET /api/auth/login` — begin the flow, returning the URL to redirect
    /// the browser to.
    ///
    /// # Errors
    /// Propagates any database failure reading the persisted WorkOS params.
    pub async fn begin_login(&self, redirect_uri: &str) -> AppResult<String> {
        let manager = ModeManager::new(self.pool.clone());
        let params = manager.load_workos_params().await?;

        let (code_verifier, code_challenge) = generate_pkce();
        let state = self.pending.begin(PendingLogin { code_verifier });

        Ok(self.provider.authorize_url(
            &params.client_id,
            &params.authkit_domain,
            redirect_uri,
            &state,
            &code_challenge,
        ))
    }

    /// `GET /api/auth/callback?code=...&state=...` — complete the flow,
    /// returning the same [`AuthOutcome`] shape as [`Authenticator::authenticate`].
    ///
    /// # Errors
    /// Returns [`AppError::AuthStateExpired`] if `state` is unknown or has
    /// expired (already consumed, or the 10-minute window elapsed), or
    /// propagates provider/database failures.
    pub async fn complete_login(&self, code: &str, state: &str) -> AppResult<AuthOutcome> {
        let pending = self
            .pending
            .consume(state)
            .ok_or(AppError::AuthStateExpired)?;

        let manager = ModeManager::new(self.pool.clone());
        let params = manager.load_workos_params().await?;

        let exchange = self
            .provider
            .exchange_code(&params.client_id, &params.api_key, code, &pending.code_verifier)
            .await?;

        let workspace = self.sole_workspace().await?;
        let is_super_admin = params
            .super_admin_emails
            .iter()
            .any(|email| email.eq_ignore_ascii_case(&exchange.user.email));

        let user = match tenancy::get_user_by_email(&self.pool, workspace.id, &exchange.user.email)
            .await?
        {
            Some(existing) => existing,
            None => {
                let display_name = match (exchange.user.first_name, exchange.user.last_name) {
                    (Some(first), Some(last)) => Some(format!("{first} {last}")),
                    (Some(first), None) => Some(first),
                    (None, Some(last)) => Some(last),
                    (None, None) => None,
                };
                let new_user = User {
                    id: Uuid::new_v4(),
                    workspace_id: workspace.id,
                    email: exchange.user.email.clone(),
                    display_name,
                    is_super_admin,
                    created_at: chrono::Utc::now(),
                    last_seen_at: None,
                };
                tenancy::create_user(&self.pool, &new_user).await?;
                new_user
            }
        };

        tenancy::touch_last_seen(&self.pool, user.id).await?;
        let cookie = issue_session(&self.pool, user.id, workspace.id).await?;

        Ok(AuthOutcome {
            principal: Principal {
                user_id: user.id,
                workspace_id: workspace.id,
                is_super_admin: user.is_super_admin,
                email: user.email,
            },
            new_session_cookie: Some(cookie),
        })
    }

    /// `WORKOS` mode still operates a single Workspace per deployment
    /// (multi-workspace federation is
    /// explicitly deferred — see `DESIGN.md`); provision it lazily on first
    /// login rather than at `configure_workos` time.
    async fn sole_workspace(&self) -> AppResult<Workspace> {
        if let Some(existing) = tenancy::first_workspace(&self.pool).await? {
            return Ok(existing);
        }
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: "Workspace".to_string(),
            slug: "workos".to_string(),
            created_at: chrono::Utc::now(),
        };
        tenancy::create_workspace(&self.pool, &workspace).await?;
        Ok(workspace)
    }
}

#[async_trait]
impl<P: WorkosProvider> Authenticator for WorkosAuthenticator<P> {
    /// `WORKOS` sessions are established only through [`Self::complete_login`];
    /// the generic [`Authenticator::authenticate`] entry point can only look
    /// up an existing session, never mint one implicitly.
    async fn authenticate(&self, session_cookie: Option<&str>) -> AppResult<AuthOutcome> {
        let cookie = session_cookie.ok_or(AppError::Unauthenticated)?;
        let existing = session::find_valid(&self.pool, cookie)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        let user = tenancy::get_user(&self.pool, existing.user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        Ok(AuthOutcome {
            principal: Principal {
                user_id: user.id,
                workspace_id: user.workspace_id,
                is_super_admin: user.is_super_admin,
                email: user.email,
            },
            new_session_cookie: None,
        })
    }
}
