// ABOUTME: GET /api/workspace — the caller's own tenant and its member list
// ABOUTME: Workspace-shared, read-only for every member; no cross-workspace visibility

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use hub_core::errors::{AppError, AppResult};
use hub_core::models::tenancy::{User, Workspace};
use serde::Serialize;

use crate::database::tenancy;
use crate::identity::Principal;

use super::AppState;

#[derive(Serialize)]
pub struct WorkspaceView {
    workspace: Workspace,
    users: Vec<User>,
}

/// `GET /api/workspace` — the caller's workspace plus its member list.
///
/// # Errors
/// Returns [`AppError::Internal`] if the principal's own workspace row has
/// gone missing (should not happen outside test fixtures); otherwise
/// propagates database failures.
pub async fn get_current(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<WorkspaceView>> {
    let workspace = tenancy::get_workspace(state.store.pool(), principal.workspace_id)
        .await?
        .ok_or_else(|| AppError::Internal("principal's workspace is missing".to_string()))?;
    let users = tenancy::list_users(state.store.pool(), principal.workspace_id).await?;
    Ok(Json(WorkspaceView { workspace, users }))
}
