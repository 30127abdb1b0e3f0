// ABOUTME: Workspace and User persistence (C6 Tenancy)
// ABOUTME: `(workspace_id, email)` is unique; LOCAL mode keeps exactly one super-admin User

use hub_core::errors::AppResult;
use hub_core::models::tenancy::{User, Workspace};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

pub(super) async fn migrate(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS workspaces (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            email TEXT NOT NULL,
            display_name TEXT,
            is_super_admin INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            last_seen_at TEXT,
            UNIQUE(workspace_id, email)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_workspace ON users(workspace_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Insert a new Workspace.
///
/// # Errors
/// Returns [`hub_core::errors::AppError::Internal`] if `slug` collides or
/// the insert otherwise fails.
pub async fn create_workspace(pool: &Pool<Sqlite>, workspace: &Workspace) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO workspaces (id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(workspace.id)
    .bind(&workspace.name)
    .bind(&workspace.slug)
    .bind(workspace.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert a new User under an existing Workspace.
///
/// # Errors
/// Returns an error if `(workspace_id, email)` already exists.
pub async fn create_user(pool: &Pool<Sqlite>, user: &User) -> AppResult<()> {
    sqlx::query(
        r"
        INSERT INTO users (id, workspace_id, email, display_name, is_super_admin, created_at, last_seen_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
    )
    .bind(user.id)
    .bind(user.workspace_id)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(user.is_super_admin)
    .bind(user.created_at)
    .bind(user.last_seen_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a User by id.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_user(pool: &Pool<Sqlite>, user_id: Uuid) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Fetch a User by `(workspace_id, email)`.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_user_by_email(
    pool: &Pool<Sqlite>,
    workspace_id: Uuid,
    email: &str,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE workspace_id = ?1 AND email = ?2",
    )
    .bind(workspace_id)
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Fetch a Workspace by id.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_workspace(pool: &Pool<Sqlite>, workspace_id: Uuid) -> AppResult<Option<Workspace>> {
    let workspace = sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = ?1")
        .bind(workspace_id)
        .fetch_optional(pool)
        .await?;
    Ok(workspace)
}

/// Whether any Workspace already exists. Used by LOCAL mode's
/// `configure_local` to locate (rather than recreate) the sole workspace
/// on an upgrade.
///
/// # Errors
/// Propagates any database failure.
pub async fn first_workspace(pool: &Pool<Sqlite>) -> AppResult<Option<Workspace>> {
    let workspace =
        sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces ORDER BY created_at ASC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(workspace)
}

/// Fetch the workspace's sole super admin. `LOCAL` mode maintains the
/// invariant that exactly one such user exists per workspace.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_super_admin(pool: &Pool<Sqlite>, workspace_id: Uuid) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE workspace_id = ?1 AND is_super_admin = 1 LIMIT 1",
    )
    .bind(workspace_id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Every User belonging to a Workspace, ordered by creation, for the
/// workspace member list the UI renders at `GET /api/workspace`.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_users(pool: &Pool<Sqlite>, workspace_id: Uuid) -> AppResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE workspace_id = ?1 ORDER BY created_at ASC",
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await?;
    Ok(users)
}

/// Every Workspace on the deployment, newest first. Platform-admin only —
/// callers must check `Principal::is_super_admin` before exposing this.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_all_workspaces(pool: &Pool<Sqlite>) -> AppResult<Vec<Workspace>> {
    let workspaces =
        sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces ORDER BY created_at DESC")
            .fetch_all(pool)
            .await?;
    Ok(workspaces)
}

/// Update `last_seen_at` to now, called on every successfully authenticated request.
///
/// # Errors
/// Propagates any database failure.
pub async fn touch_last_seen(pool: &Pool<Sqlite>, user_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE users SET last_seen_at = ?1 WHERE id = ?2")
        .bind(chrono::Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}
