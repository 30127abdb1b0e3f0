// ABOUTME: Credential Vault (C8) — per-user API keys and OAuth2 token sets, sealed at rest
// ABOUTME: Single-flight refresh coalescing via a dashmap-keyed tokio::sync::Mutex per (user_id, provider)

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hub_core::errors::{AppError, AppResult};
use hub_core::models::credential::{Credential, CredentialKind};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::crypto::Crypto;
use crate::database::credential as credential_db;
use crate::oauth_state::OAuthStateStore;
use crate::tenancy::assert_same_workspace;

/// The token material a provider hands back from an exchange or refresh.
#[derive(Debug, Clone)]
pub struct ProviderTokenSet {
    /// The bearer access token.
    pub access_token: String,
    /// A refresh token, if the provider issues one.
    pub refresh_token: Option<String>,
    /// When `access_token` expires, if the provider says.
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes the token actually carries.
    pub scopes: BTreeSet<String>,
}

/// One tool's OAuth2 provider, behind a trait so the vault is testable
/// without live network calls — mirrors the seam `WorkosProvider` gives the
/// identity adapter.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Build the URL the browser should be redirected to in order to grant
    /// `scopes`.
    fn authorize_url(&self, redirect_uri: &str, state: &str, scopes: &BTreeSet<String>) -> String;

    /// Exchange an authorization `code` for a fresh token set.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] if the exchange fails or is rejected.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AppResult<ProviderTokenSet>;

    /// Use a refresh token to mint a new access token.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] on a transient failure, or
    /// [`AppError::ReauthRequired`] if the provider has revoked the grant.
    async fn refresh(&self, refresh_token: &str) -> AppResult<ProviderTokenSet>;

    /// Best-effort revocation at the provider. Failures here never block
    /// the local delete.
    async fn revoke(&self, access_token: &str) -> AppResult<()>;
}

/// A standard OAuth2 authorization-code provider, configured per tool
/// provider (e.g. `"google"`) with its three well-known endpoints plus the
/// Hub's registered client credentials. Covers every required-OAuth tool in
/// the registry without a bespoke client per provider, the way
/// `RealWorkosProvider` is the one client WorkOS needs.
pub struct GenericOAuthProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    authorize_endpoint: String,
    token_endpoint: String,
    revoke_endpoint: Option<String>,
}

impl GenericOAuthProvider {
    /// Build a provider over its three OAuth2 endpoints. `revoke_endpoint`
    /// is optional: some providers (notably ones reached only through a
    /// thin internal gateway) don't expose one, in which case `revoke`
    /// degrades to a local-only delete.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorize_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        revoke_endpoint: Option<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_endpoint: authorize_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            revoke_endpoint,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self, requested_scopes: &BTreeSet<String>) -> ProviderTokenSet {
        let scopes = self.scope.map_or_else(
            || requested_scopes.clone(),
            |scope| scope.split_whitespace().map(str::to_string).collect(),
        );
        ProviderTokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
            scopes,
        }
    }
}

#[async_trait]
impl OAuthProvider for GenericOAuthProvider {
    fn authorize_url(&self, redirect_uri: &str, state: &str, scopes: &BTreeSet<String>) -> String {
        let scope = scopes.iter().cloned().collect::<Vec<_>>().join(" ");
        format!(
            "{base}?response_type=code&client_id={client_id}&redirect_uri={redirect_uri}\
             &state={state}&scope={scope}&access_type=offline&prompt=consent",
            base = self.authorize_endpoint,
            client_id = urlencoding::encode(&self.client_id),
            redirect_uri = urlencoding::encode(redirect_uri),
            state = urlencoding::encode(state),
            scope = urlencoding::encode(&scope),
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AppResult<ProviderTokenSet> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("oauth code exchange request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "oauth provider rejected the authorization code: {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("malformed oauth token response: {e}")))?;
        Ok(body.into_token_set(&BTreeSet::new()))
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<ProviderTokenSet> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("oauth refresh request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::BAD_REQUEST
        {
            return Err(AppError::ReauthRequired {
                provider: String::new(),
                scopes: Vec::new(),
                authorize_url: String::new(),
            });
        }
        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "oauth refresh request failed: {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("malformed oauth refresh response: {e}")))?;
        Ok(body.into_token_set(&BTreeSet::new()))
    }

    async fn revoke(&self, access_token: &str) -> AppResult<()> {
        let Some(revoke_endpoint) = &self.revoke_endpoint else {
            return Ok(());
        };
        let _ = self
            .http
            .post(revoke_endpoint)
            .form(&[("token", access_token)])
            .send()
            .await;
        Ok(())
    }
}

/// Context bound to an in-flight `start_oauth` -> `complete_oauth` round trip.
#[derive(Debug, Clone)]
struct PendingOAuth {
    user_id: Uuid,
    workspace_id: Uuid,
    provider: String,
    scopes: BTreeSet<String>,
}

/// Per-user, per-provider secret storage with OAuth2 refresh. Every secret
/// field passed to or read from the database is sealed through [`Crypto`];
/// nothing plaintext crosses the `credential_db` boundary.
pub struct Vault {
    pool: Pool<Sqlite>,
    crypto: Arc<Crypto>,
    providers: std::collections::HashMap<String, Arc<dyn OAuthProvider>>,
    pending: OAuthStateStore<PendingOAuth>,
    refresh_locks: DashMap<(Uuid, String), Arc<AsyncMutex<()>>>,
}

impl Vault {
    /// Build a `Vault` over the request-serving pool, a shared [`Crypto`]
    /// instance, and the set of configured OAuth providers keyed by
    /// provider name (e.g. `"google"`).
    #[must_use]
    pub fn new(
        pool: Pool<Sqlite>,
        crypto: Arc<Crypto>,
        providers: std::collections::HashMap<String, Arc<dyn OAuthProvider>>,
    ) -> Self {
        Self {
            pool,
            crypto,
            providers,
            pending: OAuthStateStore::new(),
            refresh_locks: DashMap::new(),
        }
    }

    fn provider(&self, name: &str) -> AppResult<&Arc<dyn OAuthProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| AppError::Internal(format!("no oauth provider configured for {name}")))
    }

    fn refresh_lock(&self, user_id: Uuid, provider: &str) -> Arc<AsyncMutex<()>> {
        self.refresh_locks
            .entry((user_id, provider.to_string()))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// `put_api_key(provider, secret)` — seal and upsert an opaque secret.
    ///
    /// # Errors
    /// Propagates crypto or database failures.
    pub async fn put_api_key(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        provider: &str,
        secret: &str,
    ) -> AppResult<()> {
        let sealed = self.crypto.seal_to_base64(secret)?;
        let credential = Credential {
            id: Uuid::new_v4(),
            workspace_id,
            user_id,
            provider: provider.to_string(),
            kind: CredentialKind::ApiKey,
            secret: Some(sealed),
            access_token: None,
            refresh_token: None,
            expires_at: None,
            scopes: BTreeSet::new(),
            issued_at: Utc::now(),
        };
        credential_db::upsert(&self.pool, &credential).await
    }

    /// `get_api_key(provider) -> secret | NotFound`, modeled as `Option<String>`
    /// since opaque-key absence is an ordinary case, not an error.
    ///
    /// # Errors
    /// Propagates crypto or database failures.
    pub async fn get_api_key(&self, workspace_id: Uuid, user_id: Uuid, provider: &str) -> AppResult<Option<String>> {
        let Some(credential) = credential_db::get(&self.pool, user_id, provider, CredentialKind::ApiKey).await?
        else {
            return Ok(None);
        };
        assert_same_workspace(credential.workspace_id, workspace_id)?;
        let Some(sealed) = &credential.secret else {
            return Ok(None);
        };
        Ok(Some(self.crypto.open_from_base64(sealed)?))
    }

    /// `start_oauth(provider, scopes) -> authorize_url`, binding a 10-minute
    /// `state` to `(user_id, provider, scopes)`.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] if `provider` has no configured
    /// [`OAuthProvider`].
    pub fn start_oauth(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        provider: &str,
        scopes: &BTreeSet<String>,
        redirect_uri: &str,
    ) -> AppResult<String> {
        let adapter = self.provider(provider)?;
        let state = self.pending.begin(PendingOAuth {
            user_id,
            workspace_id,
            provider: provider.to_string(),
            scopes: scopes.clone(),
        });
        Ok(adapter.authorize_url(redirect_uri, &state, scopes))
    }

    /// `complete_oauth(state, code) -> void` — exchanges `code` at the
    /// provider and replaces any previous token for `(user, provider)`.
    ///
    /// # Errors
    /// Returns [`AppError::AuthStateExpired`] if `state` is unknown or
    /// expired, or propagates provider/crypto/database failures.
    pub async fn complete_oauth(&self, state: &str, code: &str, redirect_uri: &str) -> AppResult<()> {
        let pending = self.pending.consume(state).ok_or(AppError::AuthStateExpired)?;
        let adapter = self.provider(&pending.provider)?;
        let tokens = adapter.exchange_code(code, redirect_uri).await?;
        self.store_tokens(pending.workspace_id, pending.user_id, &pending.provider, &tokens)
            .await
    }

    async fn store_tokens(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        provider: &str,
        tokens: &ProviderTokenSet,
    ) -> AppResult<()> {
        let sealed_access = self.crypto.seal_to_base64(&tokens.access_token)?;
        let sealed_refresh = tokens
            .refresh_token
            .as_deref()
            .map(|t| self.crypto.seal_to_base64(t))
            .transpose()?;
        let credential = Credential {
            id: Uuid::new_v4(),
            workspace_id,
            user_id,
            provider: provider.to_string(),
            kind: CredentialKind::Oauth2,
            secret: None,
            access_token: Some(sealed_access),
            refresh_token: sealed_refresh,
            expires_at: tokens.expires_at,
            scopes: tokens.scopes.clone(),
            issued_at: Utc::now(),
        };
        credential_db::upsert(&self.pool, &credential).await
    }

    /// `get_oauth(provider, required_scopes) -> access_token | NeedsRefresh | NeedsReauth`.
    ///
    /// Returns the usable access token directly. A transparent refresh is
    /// attempted when the stored token is stale but refreshable; concurrent
    /// callers for the same `(user_id, provider)` coalesce into one
    /// provider call.
    ///
    /// # Errors
    /// Returns [`AppError::NeedsOAuth`] if no credential exists yet,
    /// [`AppError::ReauthRequired`] if the grant cannot be refreshed or the
    /// provider rejects the refresh, or propagates other failures.
    pub async fn get_oauth(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        provider: &str,
        required_scopes: &BTreeSet<String>,
        redirect_uri: &str,
    ) -> AppResult<String> {
        let Some(credential) = credential_db::get(&self.pool, user_id, provider, CredentialKind::Oauth2).await?
        else {
            let authorize_url = self.start_oauth(workspace_id, user_id, provider, required_scopes, redirect_uri)?;
            return Err(AppError::NeedsOAuth {
                provider: provider.to_string(),
                scopes: required_scopes.iter().cloned().collect(),
                authorize_url,
            });
        };
        assert_same_workspace(credential.workspace_id, workspace_id)?;

        if credential.covers(required_scopes) {
            let sealed = credential
                .access_token
                .as_deref()
                .ok_or_else(|| AppError::Internal("oauth2 credential missing access_token".to_string()))?;
            return Ok(self.crypto.open_from_base64(sealed)?);
        }

        if !credential.can_refresh_for(required_scopes) {
            let authorize_url = self.start_oauth(workspace_id, user_id, provider, required_scopes, redirect_uri)?;
            return Err(AppError::ReauthRequired {
                provider: provider.to_string(),
                scopes: required_scopes.iter().cloned().collect(),
                authorize_url,
            });
        }

        let lock = self.refresh_lock(user_id, provider);
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: another caller may have already
        // refreshed while we were waiting.
        let current = credential_db::get(&self.pool, user_id, provider, CredentialKind::Oauth2)
            .await?
            .ok_or_else(|| AppError::Internal("oauth2 credential disappeared during refresh".to_string()))?;
        if current.covers(required_scopes) {
            let sealed = current
                .access_token
                .as_deref()
                .ok_or_else(|| AppError::Internal("oauth2 credential missing access_token".to_string()))?;
            return Ok(self.crypto.open_from_base64(sealed)?);
        }

        let sealed_refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or_else(|| AppError::Internal("refresh_token missing after can_refresh_for check".to_string()))?;
        let refresh_token = self.crypto.open_from_base64(sealed_refresh_token)?;

        let adapter = self.provider(provider)?;
        match adapter.refresh(&refresh_token).await {
            Ok(tokens) => {
                self.store_tokens(workspace_id, user_id, provider, &tokens).await?;
                let sealed = self.crypto.seal_to_base64(&tokens.access_token)?;
                self.crypto.open_from_base64(&sealed)
            }
            Err(_) => {
                let authorize_url = self.start_oauth(workspace_id, user_id, provider, required_scopes, redirect_uri)?;
                Err(AppError::ReauthRequired {
                    provider: provider.to_string(),
                    scopes: required_scopes.iter().cloned().collect(),
                    authorize_url,
                })
            }
        }
    }

    /// `revoke(provider)` — best-effort revocation at the provider, then
    /// unconditional local delete.
    ///
    /// # Errors
    /// Propagates only database failures; provider revocation failures are
    /// logged and swallowed.
    pub async fn revoke(&self, workspace_id: Uuid, user_id: Uuid, provider: &str) -> AppResult<()> {
        if let Some(credential) = credential_db::get(&self.pool, user_id, provider, CredentialKind::Oauth2).await? {
            assert_same_workspace(credential.workspace_id, workspace_id)?;
            if let (Ok(adapter), Some(sealed)) = (self.provider(provider), &credential.access_token) {
                if let Ok(access_token) = self.crypto.open_from_base64(sealed) {
                    if let Err(err) = adapter.revoke(&access_token).await {
                        tracing::warn!(%provider, error = %err, "provider revocation failed, continuing with local delete");
                    }
                }
            }
            credential_db::delete(&self.pool, user_id, provider, CredentialKind::Oauth2).await?;
        }
        credential_db::delete(&self.pool, user_id, provider, CredentialKind::ApiKey).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_store;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubProvider {
        exchanges: AtomicU32,
        refreshes: AtomicU32,
        refresh_should_fail: bool,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                exchanges: AtomicU32::new(0),
                refreshes: AtomicU32::new(0),
                refresh_should_fail: false,
            }
        }

        fn failing_refresh() -> Self {
            Self {
                exchanges: AtomicU32::new(0),
                refreshes: AtomicU32::new(0),
                refresh_should_fail: true,
            }
        }
    }

    #[async_trait]
    impl OAuthProvider for StubProvider {
        fn authorize_url(&self, redirect_uri: &str, state: &str, _scopes: &BTreeSet<String>) -> String {
            format!("https://provider.test/authorize?redirect_uri={redirect_uri}&state={state}")
        }

        async fn exchange_code(&self, _code: &str, _redirect_uri: &str) -> AppResult<ProviderTokenSet> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderTokenSet {
                access_token: "fresh-access".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
                scopes: BTreeSet::from(["gmail.readonly".to_string()]),
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> AppResult<ProviderTokenSet> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.refresh_should_fail {
                return Err(AppError::Internal("provider rejected refresh".to_string()));
            }
            Ok(ProviderTokenSet {
                access_token: "refreshed-access".to_string(),
                refresh_token: Some("refresh-2".to_string()),
                expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
                scopes: BTreeSet::from(["gmail.readonly".to_string()]),
            })
        }

        async fn revoke(&self, _access_token: &str) -> AppResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn api_key_round_trips_sealed() {
        let store = test_store().await;
        let crypto = Arc::new(Crypto::from_raw_key([5u8; 32]));
        let vault = Vault::new(store.pool().clone(), crypto, std::collections::HashMap::new());
        let workspace_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        vault.put_api_key(workspace_id, user_id, "openai", "sk-test-123").await.expect("put");
        let fetched = vault
            .get_api_key(workspace_id, user_id, "openai")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fetched, "sk-test-123");
    }

    #[tokio::test]
    async fn get_api_key_is_none_when_absent() {
        let store = test_store().await;
        let crypto = Arc::new(Crypto::from_raw_key([5u8; 32]));
        let vault = Vault::new(store.pool().clone(), crypto, std::collections::HashMap::new());
        let result = vault
            .get_api_key(Uuid::new_v4(), Uuid::new_v4(), "openai")
            .await
            .expect("get");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn oauth_round_trip_then_get_returns_access_token() {
        let store = test_store().await;
        let crypto = Arc::new(Crypto::from_raw_key([5u8; 32]));
        let mut providers: std::collections::HashMap<String, Arc<dyn OAuthProvider>> =
            std::collections::HashMap::new();
        providers.insert("google".to_string(), Arc::new(StubProvider::new()));
        let vault = Vault::new(store.pool().clone(), crypto, providers);

        let workspace_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let scopes = BTreeSet::from(["gmail.readonly".to_string()]);

        let url = vault
            .start_oauth(workspace_id, user_id, "google", &scopes, "https://hub.test/callback")
            .expect("start");
        assert!(url.contains("provider.test"));

        // Extract the state the stub embedded in its authorize URL.
        let state = url.split("state=").nth(1).expect("state param").to_string();
        vault
            .complete_oauth(&state, "auth-code", "https://hub.test/callback")
            .await
            .expect("complete");

        let token = vault
            .get_oauth(workspace_id, user_id, "google", &scopes, "https://hub.test/callback")
            .await
            .expect("get_oauth");
        assert_eq!(token, "fresh-access");
    }

    #[tokio::test]
    async fn missing_credential_starts_oauth_and_fails_needs_oauth() {
        let store = test_store().await;
        let crypto = Arc::new(Crypto::from_raw_key([5u8; 32]));
        let mut providers: std::collections::HashMap<String, Arc<dyn OAuthProvider>> =
            std::collections::HashMap::new();
        providers.insert("google".to_string(), Arc::new(StubProvider::new()));
        let vault = Vault::new(store.pool().clone(), crypto, providers);

        let scopes = BTreeSet::from(["gmail.readonly".to_string()]);
        let err = vault
            .get_oauth(Uuid::new_v4(), Uuid::new_v4(), "google", &scopes, "https://hub.test/callback")
            .await
            .expect_err("must need oauth");
        match err {
            AppError::NeedsOAuth { authorize_url, .. } => assert!(authorize_url.contains("provider.test")),
            other => panic!("expected NeedsOAuth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrefreshable_failed_refresh_surfaces_reauth_required() {
        let store = test_store().await;
        let crypto = Arc::new(Crypto::from_raw_key([5u8; 32]));
        let mut providers: std::collections::HashMap<String, Arc<dyn OAuthProvider>> =
            std::collections::HashMap::new();
        providers.insert("google".to_string(), Arc::new(StubProvider::failing_refresh()));
        let vault = Vault::new(store.pool().clone(), crypto, providers);

        let workspace_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let scopes = BTreeSet::from(["gmail.readonly".to_string()]);

        // Seed an already-expired but refreshable credential directly.
        let sealed_access = vault.crypto.seal_to_base64("stale-access").expect("seal");
        let sealed_refresh = vault.crypto.seal_to_base64("stale-refresh").expect("seal");
        let credential = Credential {
            id: Uuid::new_v4(),
            workspace_id,
            user_id,
            provider: "google".to_string(),
            kind: CredentialKind::Oauth2,
            secret: None,
            access_token: Some(sealed_access),
            refresh_token: Some(sealed_refresh),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(5)),
            scopes: scopes.clone(),
            issued_at: Utc::now(),
        };
        credential_db::upsert(store.pool(), &credential).await.expect("seed");

        let err = vault
            .get_oauth(workspace_id, user_id, "google", &scopes, "https://hub.test/callback")
            .await
            .expect_err("provider rejects refresh");
        assert!(matches!(err, AppError::ReauthRequired { .. }));
    }

    #[tokio::test]
    async fn cross_workspace_api_key_lookup_is_rejected() {
        let store = test_store().await;
        let crypto = Arc::new(Crypto::from_raw_key([5u8; 32]));
        let vault = Vault::new(store.pool().clone(), crypto, std::collections::HashMap::new());
        let owner_workspace = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        vault.put_api_key(owner_workspace, user_id, "openai", "sk-test").await.expect("put");

        let err = vault
            .get_api_key(Uuid::new_v4(), user_id, "openai")
            .await
            .expect_err("must mismatch");
        assert!(matches!(err, AppError::WorkspaceMismatch));
    }

    #[tokio::test]
    async fn revoke_deletes_local_credential_even_if_provider_call_fails() {
        let store = test_store().await;
        let crypto = Arc::new(Crypto::from_raw_key([5u8; 32]));
        let mut providers: std::collections::HashMap<String, Arc<dyn OAuthProvider>> =
            std::collections::HashMap::new();
        providers.insert("google".to_string(), Arc::new(StubProvider::new()));
        let vault = Vault::new(store.pool().clone(), crypto, providers);

        let workspace_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let scopes = BTreeSet::from(["gmail.readonly".to_string()]);
        let url = vault
            .start_oauth(workspace_id, user_id, "google", &scopes, "https://hub.test/callback")
            .expect("start");
        let state = url.split("state=").nth(1).expect("state").to_string();
        vault.complete_oauth(&state, "code", "https://hub.test/callback").await.expect("complete");

        vault.revoke(workspace_id, user_id, "google").await.expect("revoke");
        let err = vault
            .get_oauth(workspace_id, user_id, "google", &scopes, "https://hub.test/callback")
            .await
            .expect_err("credential gone");
        assert!(matches!(err, AppError::NeedsOAuth { .. }));
    }
}
