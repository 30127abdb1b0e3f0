// ABOUTME: AuditEvent persistence (C14 Audit) — insertion only, never updated or deleted

use hub_core::errors::AppResult;
use hub_core::models::audit::{AuditActor, AuditCategory, AuditEvent, AuditTarget};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

pub(super) async fn migrate(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS audit_log (
            id TEXT PRIMARY KEY,
            workspace_id TEXT,
            actor_user_id TEXT,
            actor_email TEXT,
            category TEXT NOT NULL,
            action TEXT NOT NULL,
            target_type TEXT NOT NULL,
            target_id TEXT,
            target_name TEXT,
            success INTEGER NOT NULL,
            error_message TEXT,
            occurred_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_log_workspace ON audit_log(workspace_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_log_occurred_at ON audit_log(occurred_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Append one immutable audit row. Never updated or deleted afterward.
///
/// # Errors
/// Propagates any database failure.
pub async fn insert(pool: &Pool<Sqlite>, event: &AuditEvent) -> AppResult<()> {
    sqlx::query(
        r"
        INSERT INTO audit_log (id, workspace_id, actor_user_id, actor_email, category, action, target_type, target_id, target_name, success, error_message, occurred_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ",
    )
    .bind(event.id)
    .bind(event.workspace_id)
    .bind(event.actor.user_id)
    .bind(&event.actor.email)
    .bind(event.category.as_str())
    .bind(&event.action)
    .bind(&event.target.target_type)
    .bind(&event.target.id)
    .bind(&event.target.name)
    .bind(event.success)
    .bind(&event.error_message)
    .bind(event.occurred_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// List recent audit events for a workspace, newest first, optionally
/// filtered to one category, `offset` rows into the result.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_for_workspace(
    pool: &Pool<Sqlite>,
    workspace_id: Uuid,
    category: Option<AuditCategory>,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<AuditEvent>> {
    let rows = if let Some(category) = category {
        sqlx::query(
            "SELECT * FROM audit_log WHERE workspace_id = ?1 AND category = ?2 ORDER BY occurred_at DESC LIMIT ?3 OFFSET ?4",
        )
        .bind(workspace_id)
        .bind(category.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query("SELECT * FROM audit_log WHERE workspace_id = ?1 ORDER BY occurred_at DESC LIMIT ?2 OFFSET ?3")
            .bind(workspace_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
    };

    rows.into_iter()
        .map(|row| {
            let category_str: String = row.get("category");
            let category = AuditCategory::parse(&category_str)
                .map_err(|bad| hub_core::errors::AppError::Internal(format!("corrupt category column: {bad}")))?;
            Ok(AuditEvent {
                id: row.get("id"),
                workspace_id: row.get("workspace_id"),
                actor: AuditActor {
                    user_id: row.get("actor_user_id"),
                    email: row.get("actor_email"),
                },
                category,
                action: row.get("action"),
                target: AuditTarget {
                    target_type: row.get("target_type"),
                    id: row.get("target_id"),
                    name: row.get("target_name"),
                },
                success: row.get("success"),
                error_message: row.get("error_message"),
                occurred_at: row.get("occurred_at"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_store;
    use chrono::Utc;

    #[tokio::test]
    async fn insert_then_list_for_workspace() {
        let store = test_store().await;
        let workspace_id = Uuid::new_v4();
        let event = AuditEvent {
            id: Uuid::new_v4(),
            workspace_id: Some(workspace_id),
            actor: AuditActor {
                user_id: Some(Uuid::new_v4()),
                email: Some("admin@acme.test".to_string()),
            },
            category: AuditCategory::Tool,
            action: "tool.activate".to_string(),
            target: AuditTarget {
                target_type: "tool".to_string(),
                id: Some("google-gmail".to_string()),
                name: Some("Gmail".to_string()),
            },
            success: true,
            error_message: None,
            occurred_at: Utc::now(),
        };
        insert(store.pool(), &event).await.expect("insert");

        let events = list_for_workspace(store.pool(), workspace_id, None, 10, 0)
            .await
            .expect("list");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "tool.activate");

        let filtered = list_for_workspace(store.pool(), workspace_id, Some(AuditCategory::Auth), 10, 0)
            .await
            .expect("list filtered");
        assert!(filtered.is_empty());

        let paged_out = list_for_workspace(store.pool(), workspace_id, None, 10, 1)
            .await
            .expect("list with offset");
        assert!(paged_out.is_empty());
    }
}
