// ABOUTME: /api/catalogue and /api/tools/* — the Tool Registry (C9) and Activation Manager (C10) surface
// ABOUTME: Every handler here requires a Principal, inserted into request extensions by auth_middleware

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use hub_core::errors::AppResult;
use hub_core::models::tool::{ToolRegistryEntry, UserTool};
use serde_json::Value;
use std::collections::HashMap;

use crate::identity::Principal;

use super::AppState;

/// `GET /api/catalogue` — every tool the registry knows about, activated or not.
pub async fn catalogue(State(state): State<Arc<AppState>>) -> Json<Vec<ToolRegistryEntry>> {
    Json(state.activation.list_catalogue().await)
}

/// `GET /api/tools` — the caller's own active tools.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_active(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<Vec<UserTool>>> {
    let tools = state.activation.list_active(principal.user_id).await?;
    Ok(Json(tools))
}

#[derive(serde::Deserialize)]
pub struct ActivateRequest {
    tool_name: String,
    #[serde(default)]
    config: Value,
}

/// `POST /api/tools` body `{tool_name, config}`.
///
/// # Errors
/// Returns [`hub_core::errors::AppError::UnknownTool`],
/// [`hub_core::errors::AppError::NeedsOAuth`]/[`hub_core::errors::AppError::ReauthRequired`],
/// or [`hub_core::errors::AppError::InvalidConfig`]; otherwise propagates
/// database failures.
pub async fn activate(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ActivateRequest>,
) -> AppResult<Json<UserTool>> {
    let oauth_redirect_uri = format!("{}/api/credentials/callback", state.public_base_url);
    let user_tool = state
        .activation
        .activate(
            principal.workspace_id,
            principal.user_id,
            &body.tool_name,
            &body.config,
            &oauth_redirect_uri,
        )
        .await?;
    Ok(Json(user_tool))
}

/// `DELETE /api/tools/:tool_name`.
///
/// # Errors
/// Propagates any database failure.
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(tool_name): Path<String>,
) -> AppResult<StatusCode> {
    state
        .activation
        .deactivate(principal.workspace_id, principal.user_id, &tool_name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/tools/:tool_name/config`.
///
/// # Errors
/// Returns [`hub_core::errors::AppError::ToolNotActivated`] if the tool
/// isn't active for this user, or propagates crypto/database failures.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(tool_name): Path<String>,
) -> AppResult<Json<HashMap<String, Value>>> {
    let config = state.activation.get_config(principal.user_id, &tool_name).await?;
    Ok(Json(config))
}

/// `PUT /api/tools/:tool_name/config` body is a partial patch merged onto
/// the existing stored config.
///
/// # Errors
/// Returns [`hub_core::errors::AppError::ToolNotActivated`] or
/// [`hub_core::errors::AppError::InvalidConfig`]; otherwise propagates
/// crypto/database failures.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(tool_name): Path<String>,
    Json(patch): Json<Value>,
) -> AppResult<StatusCode> {
    state.activation.update_config(principal.user_id, &tool_name, &patch).await?;
    Ok(StatusCode::NO_CONTENT)
}
