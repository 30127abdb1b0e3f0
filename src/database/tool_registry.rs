// ABOUTME: ToolRegistryEntry, UserTool, ToolConfig persistence (C9 Tool Registry, C10 Activation Manager)
// ABOUTME: The registry is rewritten wholesale at startup; activation/config are user-owned and soft-deleted

use std::collections::BTreeSet;

use hub_core::errors::AppResult;
use hub_core::models::tool::{AuthType, ToolConfig, ToolRegistryEntry, ToolTransport, UserTool};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

pub(super) async fn migrate(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS tool_registry (
            tool_name TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            config_schema TEXT NOT NULL,
            required_oauth TEXT NOT NULL DEFAULT '[]',
            auth_type TEXT NOT NULL,
            transport TEXT NOT NULL DEFAULT '{"kind":"in_process"}',
            icon TEXT,
            stale INTEGER NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS user_tools (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            tool_name TEXT NOT NULL REFERENCES tool_registry(tool_name),
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, tool_name)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS tool_configs (
            id TEXT PRIMARY KEY,
            user_tool_id TEXT NOT NULL REFERENCES user_tools(id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            encrypted INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            UNIQUE(user_tool_id, key)
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_registry_entry(row: &sqlx::sqlite::SqliteRow) -> AppResult<ToolRegistryEntry> {
    let required_oauth_json: String = row.try_get("required_oauth")?;
    let required_oauth: BTreeSet<String> =
        serde_json::from_str(&required_oauth_json).unwrap_or_default();
    let auth_type_str: String = row.try_get("auth_type")?;
    let auth_type = AuthType::parse(&auth_type_str).unwrap_or(AuthType::None);
    let config_schema_str: String = row.try_get("config_schema")?;
    let transport_str: String = row.try_get("transport")?;
    let transport = serde_json::from_str(&transport_str).unwrap_or(ToolTransport::InProcess);

    Ok(ToolRegistryEntry {
        tool_name: row.try_get("tool_name")?,
        display_name: row.try_get("display_name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        config_schema: serde_json::from_str(&config_schema_str).unwrap_or(serde_json::Value::Null),
        required_oauth,
        auth_type,
        transport,
        icon: row.try_get("icon")?,
        stale: row.try_get::<i64, _>("stale")? != 0,
    })
}

/// Replace the whole catalog with `entries`: upserts every entry, then
/// marks anything present in a previous scan but absent from `entries` as
/// `stale` (never deleted, so existing `UserTool`/`ToolConfig` rows keep a
/// valid foreign key).
///
/// # Errors
/// Propagates any database failure.
pub async fn rewrite_catalog(pool: &Pool<Sqlite>, entries: &[ToolRegistryEntry]) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let seen_names: Vec<&str> = entries.iter().map(|e| e.tool_name.as_str()).collect();

    for entry in entries {
        let required_oauth_json = serde_json::to_string(&entry.required_oauth)?;
        let config_schema_json = serde_json::to_string(&entry.config_schema)?;
        let transport_json = serde_json::to_string(&entry.transport)?;
        sqlx::query(
            r"
            INSERT INTO tool_registry (tool_name, display_name, description, category, config_schema, required_oauth, auth_type, transport, icon, stale)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)
            ON CONFLICT(tool_name) DO UPDATE SET
                display_name = excluded.display_name,
                description = excluded.description,
                category = excluded.category,
                config_schema = excluded.config_schema,
                required_oauth = excluded.required_oauth,
                auth_type = excluded.auth_type,
                transport = excluded.transport,
                icon = excluded.icon,
                stale = 0
            ",
        )
        .bind(&entry.tool_name)
        .bind(&entry.display_name)
        .bind(&entry.description)
        .bind(&entry.category)
        .bind(config_schema_json)
        .bind(required_oauth_json)
        .bind(entry.auth_type.as_str())
        .bind(transport_json)
        .bind(&entry.icon)
        .execute(&mut *tx)
        .await?;
    }

    if seen_names.is_empty() {
        sqlx::query("UPDATE tool_registry SET stale = 1")
            .execute(&mut *tx)
            .await?;
    } else {
        let placeholders = seen_names.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!("UPDATE tool_registry SET stale = 1 WHERE tool_name NOT IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for name in &seen_names {
            query = query.bind(*name);
        }
        query.execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// List every catalog entry, including stale ones (callers filter as needed).
///
/// # Errors
/// Propagates any database failure.
pub async fn list_catalog(pool: &Pool<Sqlite>) -> AppResult<Vec<ToolRegistryEntry>> {
    let rows = sqlx::query("SELECT * FROM tool_registry ORDER BY tool_name ASC")
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_registry_entry).collect()
}

/// Fetch one catalog entry by name.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_catalog_entry(
    pool: &Pool<Sqlite>,
    tool_name: &str,
) -> AppResult<Option<ToolRegistryEntry>> {
    let row = sqlx::query("SELECT * FROM tool_registry WHERE tool_name = ?1")
        .bind(tool_name)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_registry_entry).transpose()
}

/// Activate (or reactivate) a tool for a user. Idempotent: a second call
/// flips `enabled` back to true rather than erroring.
///
/// # Errors
/// Propagates any database failure.
pub async fn activate(
    pool: &Pool<Sqlite>,
    workspace_id: Uuid,
    user_id: Uuid,
    tool_name: &str,
) -> AppResult<UserTool> {
    let now = chrono::Utc::now();
    let id = Uuid::new_v4();
    sqlx::query(
        r"
        INSERT INTO user_tools (id, workspace_id, user_id, tool_name, enabled, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
        ON CONFLICT(user_id, tool_name) DO UPDATE SET enabled = 1, updated_at = excluded.updated_at
        ",
    )
    .bind(id)
    .bind(workspace_id)
    .bind(user_id)
    .bind(tool_name)
    .bind(now)
    .execute(pool)
    .await?;

    get_user_tool(pool, user_id, tool_name)
        .await?
        .ok_or_else(|| hub_core::errors::AppError::Internal("activation vanished after insert".to_string()))
}

/// Soft-deactivate: sets `enabled = false`, leaves the row (and its
/// `ToolConfig`s) intact.
///
/// # Errors
/// Propagates any database failure.
pub async fn deactivate(pool: &Pool<Sqlite>, user_id: Uuid, tool_name: &str) -> AppResult<()> {
    sqlx::query("UPDATE user_tools SET enabled = 0, updated_at = ?1 WHERE user_id = ?2 AND tool_name = ?3")
        .bind(chrono::Utc::now())
        .bind(user_id)
        .bind(tool_name)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetch a user's activation record for one tool, enabled or not.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_user_tool(
    pool: &Pool<Sqlite>,
    user_id: Uuid,
    tool_name: &str,
) -> AppResult<Option<UserTool>> {
    let user_tool = sqlx::query_as::<_, UserTool>(
        "SELECT * FROM user_tools WHERE user_id = ?1 AND tool_name = ?2",
    )
    .bind(user_id)
    .bind(tool_name)
    .fetch_optional(pool)
    .await?;
    Ok(user_tool)
}

/// List every tool a user has ever activated (enabled or previously
/// deactivated), for the "My Tools" listing.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_user_tools(pool: &Pool<Sqlite>, user_id: Uuid) -> AppResult<Vec<UserTool>> {
    let tools = sqlx::query_as::<_, UserTool>(
        "SELECT * FROM user_tools WHERE user_id = ?1 ORDER BY tool_name ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(tools)
}

/// Upsert one configuration key for a `UserTool`.
///
/// # Errors
/// Propagates any database failure.
pub async fn set_config(
    pool: &Pool<Sqlite>,
    user_tool_id: Uuid,
    key: &str,
    value: &serde_json::Value,
    encrypted: bool,
) -> AppResult<()> {
    let value_str = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    sqlx::query(
        r"
        INSERT INTO tool_configs (id, user_tool_id, key, value, encrypted, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(user_tool_id, key) DO UPDATE SET value = excluded.value, encrypted = excluded.encrypted, updated_at = excluded.updated_at
        ",
    )
    .bind(Uuid::new_v4())
    .bind(user_tool_id)
    .bind(key)
    .bind(value_str)
    .bind(encrypted)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// List every configuration key for a `UserTool`.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_configs(pool: &Pool<Sqlite>, user_tool_id: Uuid) -> AppResult<Vec<ToolConfig>> {
    let rows = sqlx::query("SELECT * FROM tool_configs WHERE user_tool_id = ?1")
        .bind(user_tool_id)
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|row| {
            let value_str: String = row.get("value");
            Ok(ToolConfig {
                id: row.get("id"),
                user_tool_id: row.get("user_tool_id"),
                key: row.get("key"),
                value: serde_json::from_str(&value_str)
                    .unwrap_or(serde_json::Value::String(value_str)),
                encrypted: row.get::<i64, _>("encrypted") != 0,
                updated_at: row.get("updated_at"),
            })
        })
        .collect()
}
