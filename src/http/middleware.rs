// ABOUTME: The per-request middleware chain: request id, mode gate + authenticator, then CSRF
// ABOUTME: Layered outermost-first as request id -> auth_middleware -> csrf_middleware -> handler

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{HeaderValue, SET_COOKIE};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use hub_core::errors::{AppError, AppResult};
use hub_core::models::system_config::AppMode;
use sha2::{Digest, Sha256};

use crate::identity::Authenticator;

use super::AppState;

const SESSION_COOKIE_NAME: &str = "hub_session";
const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// The raw session cookie value for the current request, stashed by
/// [`auth_middleware`] so [`csrf_middleware`] can derive the expected
/// CSRF token without a second cookie parse.
#[derive(Clone)]
struct SessionToken(String);

/// Stamp every request with a fresh id, both for the access log `TraceLayer`
/// emits and for the `x-request-id` response header a caller can correlate
/// against.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

fn csrf_token_for(session_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_token.as_bytes());
    hasher.update(b"csrf");
    hex::encode(hasher.finalize())
}

/// The mode gate and authenticator selection folded into one middleware:
/// both need the same freshly loaded [`AppMode`], and a mode transition
/// mid-request would otherwise be observable as an inconsistent pairing of
/// the two.
///
/// # Errors
/// Returns [`AppError::SetupRequired`] while the system is still
/// `UNCONFIGURED`, or propagates whatever the active
/// [`crate::identity::Authenticator`] returns.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let mode = state.mode_manager.current_mode().await?;
    if mode == AppMode::Unconfigured {
        return Err(AppError::SetupRequired);
    }

    let session_cookie = jar.get(SESSION_COOKIE_NAME).map(|c| c.value().to_string());

    let outcome = if mode == AppMode::Local {
        let authenticator: &dyn Authenticator = &state.local_auth;
        authenticator.authenticate(session_cookie.as_deref()).await?
    } else {
        let authenticator: &dyn Authenticator = &state.workos_auth;
        authenticator.authenticate(session_cookie.as_deref()).await?
    };

    req.extensions_mut().insert(outcome.principal.clone());
    let effective_token = outcome.new_session_cookie.clone().or(session_cookie);
    if let Some(token) = &effective_token {
        req.extensions_mut().insert(SessionToken(token.clone()));
    }

    let mut response = next.run(req).await;

    if let Some(new_token) = outcome.new_session_cookie {
        let cookie_header = format!(
            "{SESSION_COOKIE_NAME}={new_token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            crate::identity::SESSION_TTL.num_seconds()
        );
        if let Ok(value) = HeaderValue::from_str(&cookie_header) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }

    Ok(response)
}

/// Validate a `x-csrf-token` header on state-changing requests, per the
/// teacher's `requires_csrf_validation` method gate. The expected value is
/// derived from the session token rather than tracked in a separate store,
/// since this Hub's sessions are already server-side and single-use per
/// cookie.
///
/// # Errors
/// Returns [`AppError::Forbidden`] if the header is missing or does not
/// match the session-derived token.
pub async fn csrf_middleware(req: Request, next: Next) -> AppResult<Response> {
    let needs_csrf = matches!(
        *req.method(),
        axum::http::Method::POST | axum::http::Method::PUT | axum::http::Method::DELETE | axum::http::Method::PATCH
    );

    if needs_csrf {
        let session_token = req
            .extensions()
            .get::<SessionToken>()
            .map(|t| t.0.clone())
            .ok_or(AppError::Unauthenticated)?;
        let expected = csrf_token_for(&session_token);
        let presented = req
            .headers()
            .get(CSRF_HEADER_NAME)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if presented != expected {
            return Err(AppError::Forbidden {
                reason: "missing or invalid csrf token".to_string(),
            });
        }
    }

    Ok(next.run(req).await)
}
