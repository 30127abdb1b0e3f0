// ABOUTME: /api/auth/* — delegated login for WORKOS, trivial confirmation for LOCAL
// ABOUTME: `callback` is the only place a session cookie is minted outside auth_middleware's implicit LOCAL issuance

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hub_core::errors::{AppError, AppResult};
use hub_core::models::system_config::AppMode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::identity::revoke_session;

use super::AppState;

#[derive(Serialize)]
pub struct AuthorizeResponse {
    authorization_url: String,
}

/// `GET /api/auth/authorize` — under `LOCAL` there is no delegated
/// provider, so this simply points back at the Hub itself; under `WORKOS`
/// it returns the AuthKit redirect URL.
///
/// # Errors
/// Propagates a database failure reading the current mode or the
/// persisted WorkOS params.
pub async fn authorize(State(state): State<Arc<AppState>>) -> AppResult<Json<AuthorizeResponse>> {
    let mode = state.mode_manager.current_mode().await?;
    let authorization_url = match mode {
        AppMode::Workos => {
            let redirect_uri = format!("{}/api/auth/callback", state.public_base_url);
            state.workos_auth.begin_login(&redirect_uri).await?
        }
        AppMode::Local | AppMode::Unconfigured => state.public_base_url.clone(),
    };
    Ok(Json(AuthorizeResponse { authorization_url }))
}

#[derive(Deserialize)]
pub struct CallbackRequest {
    code: String,
    state: String,
}

#[derive(Serialize)]
struct UserSummary {
    id: uuid::Uuid,
    email: String,
    is_super_admin: bool,
}

/// `POST /api/auth/callback` — complete a `WORKOS` login, setting the
/// session cookie on the response.
///
/// # Errors
/// Returns [`AppError::AuthStateExpired`] if `state` is unknown or
/// expired, or propagates provider/database failures.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CallbackRequest>,
) -> AppResult<Response> {
    let outcome = state.workos_auth.complete_login(&body.code, &body.state).await?;
    let cookie_value = outcome.new_session_cookie.ok_or_else(|| {
        AppError::Internal("workos login completed without issuing a session".to_string())
    })?;

    let mut response = Json(json!({
        "user": UserSummary {
            id: outcome.principal.user_id,
            email: outcome.principal.email,
            is_super_admin: outcome.principal.is_super_admin,
        }
    }))
    .into_response();

    let cookie_header = format!(
        "hub_session={cookie_value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        crate::identity::SESSION_TTL.num_seconds()
    );
    if let Ok(value) = HeaderValue::from_str(&cookie_header) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    Ok(response)
}

/// `POST /api/auth/logout` — a real session deletion, not just letting the
/// cookie expire.
///
/// # Errors
/// Propagates any database failure.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: axum_extra::extract::cookie::CookieJar,
) -> AppResult<StatusCodeResponse> {
    if let Some(cookie) = jar.get("hub_session") {
        revoke_session(state.store.pool(), cookie.value()).await?;
    }
    Ok(StatusCodeResponse)
}

/// A bare 204 that also clears the session cookie client-side.
pub struct StatusCodeResponse;

impl IntoResponse for StatusCodeResponse {
    fn into_response(self) -> Response {
        let mut response = axum::http::StatusCode::NO_CONTENT.into_response();
        if let Ok(value) =
            HeaderValue::from_str("hub_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
        {
            response.headers_mut().append(SET_COOKIE, value);
        }
        response
    }
}
