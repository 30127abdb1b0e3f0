// ABOUTME: /api/admin/* — platform-admin-only operations, gated on Principal::is_super_admin
// ABOUTME: Deliberately thin: every admin action here delegates to the same manager a regular route would use

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use hub_core::errors::{AppError, AppResult};
use hub_core::models::tenancy::Workspace;

use crate::database::tenancy;
use crate::identity::Principal;

use super::AppState;

fn require_super_admin(principal: &Principal) -> AppResult<()> {
    if principal.is_super_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden {
            reason: "platform admin role required".to_string(),
        })
    }
}

/// `GET /api/admin/workspaces` — every workspace on the deployment.
///
/// # Errors
/// Returns [`AppError::Forbidden`] unless the caller is a platform admin;
/// otherwise propagates database failures.
pub async fn list_workspaces(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<Vec<Workspace>>> {
    require_super_admin(&principal)?;
    let workspaces = tenancy::list_all_workspaces(state.store.pool()).await?;
    Ok(Json(workspaces))
}

/// `POST /api/admin/registry/refresh` — force an immediate Tool Registry
/// (C9) re-scan, e.g. after an operator drops a new descriptor file onto a
/// running Hub without waiting for the next restart.
///
/// # Errors
/// Returns [`AppError::Forbidden`] unless the caller is a platform admin;
/// otherwise propagates database failures from the rescan.
pub async fn refresh_registry(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<serde_json::Value>> {
    require_super_admin(&principal)?;
    let descriptor_count = state.registry.refresh().await?;
    Ok(Json(serde_json::json!({ "descriptor_count": descriptor_count })))
}

/// `GET /api/admin/status` — a platform-wide snapshot for the admin
/// dashboard: current mode and process uptime, supplementing the
/// always-public `/health` with fields only an admin should see.
///
/// # Errors
/// Returns [`AppError::Forbidden`] unless the caller is a platform admin;
/// otherwise propagates a Mode Manager failure.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<serde_json::Value>> {
    require_super_admin(&principal)?;
    let (mode, _) = state.mode_manager.status().await?;
    Ok(Json(serde_json::json!({
        "mode": mode,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    })))
}
