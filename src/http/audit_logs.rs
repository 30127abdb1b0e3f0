// ABOUTME: GET /api/audit-logs — a read-only, paginated view over the Audit Log (C14)
// ABOUTME: offset-paginated rather than cursor-based; see DESIGN.md

use std::sync::Arc;

use axum::extract::{Extension, Query, State};
use axum::Json;
use hub_core::errors::{AppError, AppResult};
use hub_core::models::audit::{AuditCategory, AuditEvent};
use serde::Deserialize;

use crate::database::audit;
use crate::identity::Principal;

use super::AppState;

fn default_limit() -> i64 {
    50
}

#[derive(Deserialize)]
pub struct AuditLogQuery {
    category: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

/// `GET /api/audit-logs?category=&limit=&offset=` — events for the
/// caller's own workspace, newest first.
///
/// # Errors
/// Returns [`AppError::InvalidConfig`] if `category` is not a recognized
/// [`AuditCategory`], or propagates any database failure.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<Json<Vec<AuditEvent>>> {
    let category = query
        .category
        .as_deref()
        .map(AuditCategory::parse)
        .transpose()
        .map_err(|bad| AppError::InvalidConfig {
            field_errors: std::collections::HashMap::from([(
                "category".to_string(),
                format!("unrecognized audit category: {bad}"),
            )]),
        })?;

    let events = audit::list_for_workspace(
        state.store.pool(),
        principal.workspace_id,
        category,
        query.limit,
        query.offset,
    )
    .await?;
    Ok(Json(events))
}
