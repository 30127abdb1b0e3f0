// ABOUTME: /api/credentials/* — the Credential Vault (C8) surface for opaque API keys and OAuth2 grants
// ABOUTME: Not named in the selected-contracts list but required to reach C8 at all; recorded in DESIGN.md

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use hub_core::errors::AppResult;
use serde::{Deserialize, Serialize};

use crate::identity::Principal;

use super::AppState;

#[derive(Deserialize)]
pub struct PutApiKeyRequest {
    secret: String,
}

/// `PUT /api/credentials/:provider` body `{secret}` — store an opaque API key.
///
/// # Errors
/// Propagates crypto or database failures.
pub async fn put_api_key(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(provider): Path<String>,
    Json(body): Json<PutApiKeyRequest>,
) -> AppResult<StatusCode> {
    state
        .vault
        .put_api_key(principal.workspace_id, principal.user_id, &provider, &body.secret)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/credentials/:provider` — revoke whichever kind of
/// credential is stored for this provider.
///
/// # Errors
/// Propagates database failures.
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(provider): Path<String>,
) -> AppResult<StatusCode> {
    state
        .vault
        .revoke(principal.workspace_id, principal.user_id, &provider)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct StartOAuthRequest {
    #[serde(default)]
    scopes: BTreeSet<String>,
}

#[derive(Serialize)]
pub struct AuthorizeUrlResponse {
    authorization_url: String,
}

/// `POST /api/credentials/:provider/oauth/start` body `{scopes}`.
///
/// # Errors
/// Returns [`hub_core::errors::AppError::Internal`] if `provider` has no
/// configured OAuth adapter.
pub async fn start_oauth(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(provider): Path<String>,
    Json(body): Json<StartOAuthRequest>,
) -> AppResult<Json<AuthorizeUrlResponse>> {
    let redirect_uri = format!("{}/api/credentials/callback", state.public_base_url);
    let authorization_url = state.vault.start_oauth(
        principal.workspace_id,
        principal.user_id,
        &provider,
        &body.scopes,
        &redirect_uri,
    )?;
    Ok(Json(AuthorizeUrlResponse { authorization_url }))
}

#[derive(Deserialize)]
pub struct OAuthCallbackQuery {
    code: String,
    state: String,
}

/// `POST /api/credentials/callback` — the provider redirects here with
/// `?code=&state=`; public since the caller has no Hub session yet at the
/// point the provider issues the redirect.
///
/// # Errors
/// Returns [`hub_core::errors::AppError::AuthStateExpired`] if `state` is
/// unknown or expired, or propagates provider/crypto/database failures.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthCallbackQuery>,
) -> AppResult<StatusCode> {
    let redirect_uri = format!("{}/api/credentials/callback", state.public_base_url);
    state.vault.complete_oauth(&query.state, &query.code, &redirect_uri).await?;
    Ok(StatusCode::NO_CONTENT)
}
