// ABOUTME: BaseFolder, Project, Agent persistence (C12 Agent Discovery)
// ABOUTME: `agents.state`/`agents.state_error` split the data-carrying AgentState across two columns

use hub_core::errors::AppResult;
use hub_core::models::discovery::{Agent, AgentState, AgentToolkit, BaseFolder, Project};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

pub(super) async fn migrate(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS base_folders (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            label TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            base_folder_id TEXT NOT NULL REFERENCES base_folders(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            absolute_path TEXT NOT NULL,
            last_scanned_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            relative_path TEXT NOT NULL,
            name TEXT NOT NULL,
            icon TEXT,
            file_hash TEXT NOT NULL,
            toolkit TEXT NOT NULL,
            raw_frontmatter TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'fresh',
            state_error TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE(project_id, relative_path)
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> AppResult<Agent> {
    let state_str: String = row.try_get("state")?;
    let state_error: Option<String> = row.try_get("state_error")?;
    let state = AgentState::from_columns(&state_str, state_error)
        .map_err(|bad| hub_core::errors::AppError::Internal(format!("corrupt state column: {bad}")))?;

    let toolkit_str: String = row.try_get("toolkit")?;
    let toolkit: AgentToolkit = serde_json::from_str(&toolkit_str).unwrap_or_default();
    let raw_frontmatter_str: String = row.try_get("raw_frontmatter")?;
    let raw_frontmatter =
        serde_json::from_str(&raw_frontmatter_str).unwrap_or(serde_json::Value::Null);

    Ok(Agent {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        relative_path: row.try_get("relative_path")?,
        name: row.try_get("name")?,
        icon: row.try_get("icon")?,
        file_hash: row.try_get("file_hash")?,
        toolkit,
        raw_frontmatter,
        state,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new `BaseFolder`.
///
/// # Errors
/// Propagates any database failure.
pub async fn create_base_folder(pool: &Pool<Sqlite>, folder: &BaseFolder) -> AppResult<()> {
    sqlx::query("INSERT INTO base_folders (id, workspace_id, path, label) VALUES (?1, ?2, ?3, ?4)")
        .bind(folder.id)
        .bind(folder.workspace_id)
        .bind(&folder.path)
        .bind(&folder.label)
        .execute(pool)
        .await?;
    Ok(())
}

/// List every `BaseFolder` owned by a workspace.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_base_folders(pool: &Pool<Sqlite>, workspace_id: Uuid) -> AppResult<Vec<BaseFolder>> {
    let folders = sqlx::query_as::<_, BaseFolder>("SELECT * FROM base_folders WHERE workspace_id = ?1")
        .bind(workspace_id)
        .fetch_all(pool)
        .await?;
    Ok(folders)
}

/// List every `BaseFolder` across every workspace. Used once at startup to
/// seed the agent-discovery filesystem watcher over every already-registered
/// scan root.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_all_base_folders(pool: &Pool<Sqlite>) -> AppResult<Vec<BaseFolder>> {
    let folders = sqlx::query_as::<_, BaseFolder>("SELECT * FROM base_folders")
        .fetch_all(pool)
        .await?;
    Ok(folders)
}

/// Upsert a discovered `Project` keyed by `(base_folder_id, absolute_path)`.
///
/// # Errors
/// Propagates any database failure.
pub async fn upsert_project(pool: &Pool<Sqlite>, project: &Project) -> AppResult<()> {
    sqlx::query(
        r"
        INSERT INTO projects (id, base_folder_id, name, absolute_path, last_scanned_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET last_scanned_at = excluded.last_scanned_at
        ",
    )
    .bind(project.id)
    .bind(project.base_folder_id)
    .bind(&project.name)
    .bind(&project.absolute_path)
    .bind(project.last_scanned_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// List every `Project` under a `BaseFolder`.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_projects(pool: &Pool<Sqlite>, base_folder_id: Uuid) -> AppResult<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE base_folder_id = ?1")
        .bind(base_folder_id)
        .fetch_all(pool)
        .await?;
    Ok(projects)
}

/// Upsert an `Agent`, keyed by `(project_id, relative_path)`.
///
/// # Errors
/// Propagates any database failure.
pub async fn upsert_agent(pool: &Pool<Sqlite>, agent: &Agent) -> AppResult<()> {
    let toolkit_json = serde_json::to_string(&agent.toolkit)?;
    let raw_frontmatter_json = serde_json::to_string(&agent.raw_frontmatter)?;
    let state_error = match &agent.state {
        AgentState::Broken { error } => Some(error.clone()),
        _ => None,
    };

    sqlx::query(
        r"
        INSERT INTO agents (id, project_id, relative_path, name, icon, file_hash, toolkit, raw_frontmatter, state, state_error, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(project_id, relative_path) DO UPDATE SET
            name = excluded.name,
            icon = excluded.icon,
            file_hash = excluded.file_hash,
            toolkit = excluded.toolkit,
            raw_frontmatter = excluded.raw_frontmatter,
            state = excluded.state,
            state_error = excluded.state_error,
            updated_at = excluded.updated_at
        ",
    )
    .bind(agent.id)
    .bind(agent.project_id)
    .bind(&agent.relative_path)
    .bind(&agent.name)
    .bind(&agent.icon)
    .bind(&agent.file_hash)
    .bind(toolkit_json)
    .bind(raw_frontmatter_json)
    .bind(agent.state.as_str())
    .bind(state_error)
    .bind(agent.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// List every `Agent` under a `Project`.
///
/// # Errors
/// Propagates any database failure.
pub async fn list_agents(pool: &Pool<Sqlite>, project_id: Uuid) -> AppResult<Vec<Agent>> {
    let rows = sqlx::query("SELECT * FROM agents WHERE project_id = ?1")
        .bind(project_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_agent).collect()
}

/// Fetch one `Agent` by `(project_id, relative_path)`.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_agent(
    pool: &Pool<Sqlite>,
    project_id: Uuid,
    relative_path: &str,
) -> AppResult<Option<Agent>> {
    let row = sqlx::query("SELECT * FROM agents WHERE project_id = ?1 AND relative_path = ?2")
        .bind(project_id)
        .bind(relative_path)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_agent).transpose()
}

/// Fetch one `Agent` by primary key.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_agent_by_id(pool: &Pool<Sqlite>, agent_id: Uuid) -> AppResult<Option<Agent>> {
    let row = sqlx::query("SELECT * FROM agents WHERE id = ?1")
        .bind(agent_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_agent).transpose()
}

/// Fetch one `Project` by primary key.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_project(pool: &Pool<Sqlite>, project_id: Uuid) -> AppResult<Option<Project>> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?1")
        .bind(project_id)
        .fetch_optional(pool)
        .await?;
    Ok(project)
}

/// Fetch one `BaseFolder` by primary key.
///
/// # Errors
/// Propagates any database failure.
pub async fn get_base_folder(pool: &Pool<Sqlite>, base_folder_id: Uuid) -> AppResult<Option<BaseFolder>> {
    let folder = sqlx::query_as::<_, BaseFolder>("SELECT * FROM base_folders WHERE id = ?1")
        .bind(base_folder_id)
        .fetch_optional(pool)
        .await?;
    Ok(folder)
}

/// Mark an `Agent` dirty (file changed on disk, not yet reparsed).
///
/// # Errors
/// Propagates any database failure.
pub async fn mark_dirty(pool: &Pool<Sqlite>, agent_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE agents SET state = 'dirty', state_error = NULL, updated_at = ?1 WHERE id = ?2")
        .bind(chrono::Utc::now())
        .bind(agent_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_store;
    use chrono::Utc;

    #[tokio::test]
    async fn agent_state_roundtrips_including_broken_reason() {
        let store = test_store().await;
        let project_id = Uuid::new_v4();
        let agent = Agent {
            id: Uuid::new_v4(),
            project_id,
            relative_path: "agents/reviewer.md".to_string(),
            name: "Reviewer".to_string(),
            icon: None,
            file_hash: "deadbeef".to_string(),
            toolkit: AgentToolkit::default(),
            raw_frontmatter: serde_json::json!({"model": "sonnet"}),
            state: AgentState::Broken {
                error: "unterminated frontmatter block".to_string(),
            },
            updated_at: Utc::now(),
        };
        upsert_agent(store.pool(), &agent).await.expect("upsert");

        let fetched = get_agent(store.pool(), project_id, "agents/reviewer.md")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(
            fetched.state,
            AgentState::Broken {
                error: "unterminated frontmatter block".to_string()
            }
        );
    }

    #[tokio::test]
    async fn mark_dirty_clears_previous_broken_reason() {
        let store = test_store().await;
        let project_id = Uuid::new_v4();
        let agent = Agent {
            id: Uuid::new_v4(),
            project_id,
            relative_path: "agents/reviewer.md".to_string(),
            name: "Reviewer".to_string(),
            icon: None,
            file_hash: "deadbeef".to_string(),
            toolkit: AgentToolkit::default(),
            raw_frontmatter: serde_json::Value::Null,
            state: AgentState::Broken {
                error: "boom".to_string(),
            },
            updated_at: Utc::now(),
        };
        upsert_agent(store.pool(), &agent).await.expect("upsert");
        mark_dirty(store.pool(), agent.id).await.expect("mark dirty");

        let fetched = get_agent(store.pool(), project_id, "agents/reviewer.md")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fetched.state, AgentState::Dirty);
    }
}
