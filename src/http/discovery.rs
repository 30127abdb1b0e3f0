// ABOUTME: /api/discovery/* — Agent Discovery (C12) scan roots, projects, and per-agent toolkits
// ABOUTME: base-folders routes aren't named in the selected-contracts list but are required so list_projects has something to scope to

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use hub_core::errors::AppResult;
use hub_core::models::discovery::{Agent, AgentToolkit, BaseFolder, Project};
use serde::Deserialize;
use uuid::Uuid;

use crate::identity::Principal;

use super::AppState;

#[derive(Deserialize)]
pub struct CreateBaseFolderRequest {
    path: String,
    label: String,
}

/// `POST /api/discovery/base-folders` body `{path, label}`.
///
/// # Errors
/// Propagates any database or filesystem failure.
pub async fn create_base_folder(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateBaseFolderRequest>,
) -> AppResult<Json<BaseFolder>> {
    let folder = state
        .discovery
        .create_base_folder(principal.workspace_id, &body.path, &body.label)
        .await?;

    if let Some(watcher) = &state.watcher {
        let mut watcher = watcher.lock().await;
        if let Err(err) = watcher.watch_additional(std::path::Path::new(&folder.path)) {
            tracing::warn!(path = %folder.path, error = %err, "failed to add new base folder to the filesystem watcher; hot reload will not see its changes until restart");
        }
    }

    Ok(Json(folder))
}

/// `GET /api/discovery/base-folders`.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_base_folders(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<Vec<BaseFolder>>> {
    let folders = state.discovery.list_base_folders(principal.workspace_id).await?;
    Ok(Json(folders))
}

/// `POST /api/discovery/base-folders/:base_folder_id/sync` — rescan one
/// base folder for new or removed projects.
///
/// # Errors
/// Propagates any database or filesystem failure.
pub async fn sync_base_folder(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(base_folder_id): Path<Uuid>,
) -> AppResult<Json<Vec<Project>>> {
    let projects = state
        .discovery
        .sync_base_folder(principal.workspace_id, base_folder_id)
        .await?;
    Ok(Json(projects))
}

#[derive(Deserialize)]
pub struct ListProjectsQuery {
    base_folder_id: Uuid,
}

/// `GET /api/discovery/projects?base_folder_id=`.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    axum::extract::Query(query): axum::extract::Query<ListProjectsQuery>,
) -> AppResult<Json<Vec<Project>>> {
    let projects = state
        .discovery
        .list_projects(principal.workspace_id, query.base_folder_id)
        .await?;
    Ok(Json(projects))
}

/// `POST /api/discovery/projects/:project_id/sync` — rescan one project's
/// agents directory.
///
/// # Errors
/// Propagates any database or filesystem failure.
pub async fn sync_project(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Agent>>> {
    let agents = state.discovery.sync_project(principal.workspace_id, project_id).await?;
    Ok(Json(agents))
}

/// `GET /api/discovery/agents/:agent_id/toolkit`.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_agent_toolkit(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(agent_id): Path<Uuid>,
) -> AppResult<Json<AgentToolkit>> {
    let toolkit = state.discovery.get_agent_toolkit(principal.workspace_id, agent_id).await?;
    Ok(Json(toolkit))
}

/// `PUT /api/discovery/agents/:agent_id/toolkit` — writes the new grant set
/// back into the agent's frontmatter, not just the database.
///
/// # Errors
/// Returns [`hub_core::errors::AppError::FrontmatterWriteFailed`] if the
/// file write fails after the database row was updated, or propagates
/// other database/filesystem failures.
pub async fn update_agent_toolkit(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(agent_id): Path<Uuid>,
    Json(new_toolkit): Json<AgentToolkit>,
) -> AppResult<Json<AgentToolkit>> {
    let toolkit = state
        .discovery
        .update_agent_toolkit(principal.workspace_id, agent_id, new_toolkit, Some(&principal.email))
        .await?;
    Ok(Json(toolkit))
}
