// ABOUTME: /api/setup/* — bootstrap endpoints gated only by AppMode itself, never by auth_middleware
// ABOUTME: Public routes: these run before any session can exist

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use hub_core::errors::AppResult;
use serde::{Deserialize, Serialize};

use crate::identity::workos::WorkosCredentialValidator;
use crate::mode::WorkosParams;

use super::AppState;

/// `GET /api/setup/status` response body.
#[derive(Serialize)]
pub struct StatusResponse {
    mode: &'static str,
    is_setup_required: bool,
}

/// # Errors
/// Propagates any database failure reading the current mode.
pub async fn status(State(state): State<Arc<AppState>>) -> AppResult<Json<StatusResponse>> {
    let (mode, is_setup_required) = state.mode_manager.status().await?;
    Ok(Json(StatusResponse {
        mode: mode.as_str(),
        is_setup_required,
    }))
}

#[derive(Deserialize)]
pub struct LocalSetupRequest {
    admin_email: String,
}

/// # Errors
/// Returns [`hub_core::errors::AppError::AlreadyConfigured`] outside
/// `UNCONFIGURED`, or propagates a database failure.
pub async fn configure_local(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LocalSetupRequest>,
) -> AppResult<StatusCode> {
    state.mode_manager.configure_local(&body.admin_email).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct WorkosSetupRequest {
    client_id: String,
    api_key: String,
    authkit_domain: String,
    super_admin_emails: Vec<String>,
}

impl From<WorkosSetupRequest> for WorkosParams {
    fn from(body: WorkosSetupRequest) -> Self {
        Self {
            client_id: body.client_id,
            api_key: body.api_key,
            authkit_domain: body.authkit_domain,
            super_admin_emails: body.super_admin_emails,
        }
    }
}

/// # Errors
/// Returns [`hub_core::errors::AppError::AlreadyConfigured`] outside
/// `UNCONFIGURED`, or propagates provider validation or database failures.
pub async fn configure_workos(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WorkosSetupRequest>,
) -> AppResult<StatusCode> {
    let validator = WorkosCredentialValidator::default();
    state.mode_manager.configure_workos(&validator, &body.into()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// # Errors
/// Returns [`hub_core::errors::AppError::AlreadyConfigured`] outside
/// `LOCAL`, or propagates provider validation or database failures.
pub async fn upgrade_to_workos(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WorkosSetupRequest>,
) -> AppResult<StatusCode> {
    let validator = WorkosCredentialValidator::default();
    state.mode_manager.upgrade_to_workos(&validator, &body.into()).await?;
    Ok(StatusCode::NO_CONTENT)
}
