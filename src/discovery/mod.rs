// ABOUTME: Agent Discovery (C12) — scan -> parse -> cache -> watch -> write-back
// ABOUTME: Orchestrates the scanner, parser, and write-back helpers over the C2 persistence layer; the in-memory cache is simply "the latest row per agent", invalidated on file_hash mismatch

/// YAML-frontmatter-over-Markdown parsing and the `hub.toolkit` model.
pub mod parser;
/// Breadth-first BaseFolder/Project/Agent-file scanning.
pub mod scanner;
/// Debounced filesystem watching for hot reload.
pub mod watcher;
/// Surgical `hub.toolkit` region replacement in agent frontmatter.
pub mod writeback;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use hub_core::errors::{AppError, AppResult};
use hub_core::models::audit::{AuditActor, AuditCategory, AuditTarget};
use hub_core::models::discovery::{Agent, AgentState, AgentToolkit, BaseFolder, Project};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::audit::{AuditDraft, AuditSink};
use crate::database::discovery as discovery_db;
use crate::tenancy::assert_same_workspace;

/// Orchestrates the filesystem scanner, the frontmatter parser, and the
/// write-back path over the discovery persistence layer (C2). Holds no
/// cache of its own beyond the database rows — "the cache" here is the
/// latest `Agent` row per `(project_id, relative_path)`, kept
/// fresh by [`Self::sync_project`] and invalidated by a `file_hash`
/// mismatch exactly as specified.
#[derive(Clone)]
pub struct DiscoveryService {
    pool: Pool<Sqlite>,
    audit: AuditSink,
}

impl DiscoveryService {
    /// Build a `DiscoveryService` over the discovery-scan pool and the
    /// shared audit sink.
    #[must_use]
    pub fn new(pool: Pool<Sqlite>, audit: AuditSink) -> Self {
        Self { pool, audit }
    }

    /// Register a new scan root for a workspace.
    ///
    /// # Errors
    /// Propagates any database failure.
    pub async fn create_base_folder(&self, workspace_id: Uuid, path: &str, label: &str) -> AppResult<BaseFolder> {
        let folder = BaseFolder {
            id: Uuid::new_v4(),
            workspace_id,
            path: path.to_string(),
            label: label.to_string(),
        };
        discovery_db::create_base_folder(&self.pool, &folder).await?;
        Ok(folder)
    }

    /// `GET /api/discovery/*` — list every `BaseFolder` for a workspace.
    ///
    /// # Errors
    /// Propagates any database failure.
    pub async fn list_base_folders(&self, workspace_id: Uuid) -> AppResult<Vec<BaseFolder>> {
        discovery_db::list_base_folders(&self.pool, workspace_id).await
    }

    /// Every `BaseFolder` across every workspace, used once at startup to
    /// seed the filesystem watcher (§4.12 "Watch").
    ///
    /// # Errors
    /// Propagates any database failure.
    pub async fn list_all_base_folders(&self) -> AppResult<Vec<BaseFolder>> {
        discovery_db::list_all_base_folders(&self.pool).await
    }

    /// `GET /api/discovery/projects` — list every `Project` under a
    /// `BaseFolder`, checking tenancy first.
    ///
    /// # Errors
    /// Returns [`AppError::WorkspaceMismatch`] if the folder belongs to a
    /// different workspace, or propagates a database failure.
    pub async fn list_projects(&self, workspace_id: Uuid, base_folder_id: Uuid) -> AppResult<Vec<Project>> {
        let folder = discovery_db::get_base_folder(&self.pool, base_folder_id)
            .await?
            .ok_or_else(|| AppError::Internal("base folder not found".to_string()))?;
        assert_same_workspace(folder.workspace_id, workspace_id)?;
        discovery_db::list_projects(&self.pool, base_folder_id).await
    }

    /// Re-scan `base_folder_id` for git repositories, upserting a `Project`
    /// row per discovery, then sync every project's agents.
    ///
    /// # Errors
    /// Returns [`AppError::WorkspaceMismatch`] if the folder belongs to a
    /// different workspace, or propagates a database failure.
    pub async fn sync_base_folder(&self, workspace_id: Uuid, base_folder_id: Uuid) -> AppResult<Vec<Project>> {
        let folder = discovery_db::get_base_folder(&self.pool, base_folder_id)
            .await?
            .ok_or_else(|| AppError::Internal("base folder not found".to_string()))?;
        assert_same_workspace(folder.workspace_id, workspace_id)?;

        let discovered = scanner::scan_base_folder(Path::new(&folder.path));
        let mut projects = Vec::with_capacity(discovered.len());
        for found in discovered {
            let project = Project {
                id: Uuid::new_v4(),
                base_folder_id,
                name: found.name,
                absolute_path: found.absolute_path.to_string_lossy().into_owned(),
                last_scanned_at: Utc::now(),
            };
            discovery_db::upsert_project(&self.pool, &project).await?;
            self.sync_project(workspace_id, project.id).await?;
            projects.push(project);
        }
        Ok(projects)
    }

    /// Re-scan one project's agents directory: parse every candidate
    /// Markdown file, upsert the resulting `Agent` row (`fresh` on success,
    /// `broken` with the parse error on failure), and return every agent
    /// now on record for the project.
    ///
    /// # Errors
    /// Returns [`AppError::WorkspaceMismatch`] on tenancy mismatch, or
    /// propagates a database failure. A per-file parse failure is *not*
    /// an error here — it is recorded as a `broken` Agent row instead.
    pub async fn sync_project(&self, workspace_id: Uuid, project_id: Uuid) -> AppResult<Vec<Agent>> {
        let project = discovery_db::get_project(&self.pool, project_id)
            .await?
            .ok_or_else(|| AppError::Internal("project not found".to_string()))?;
        let folder = discovery_db::get_base_folder(&self.pool, project.base_folder_id)
            .await?
            .ok_or_else(|| AppError::Internal("base folder not found".to_string()))?;
        assert_same_workspace(folder.workspace_id, workspace_id)?;

        let project_root = PathBuf::from(&project.absolute_path);
        let candidates = scanner::scan_agent_files(&project_root);

        for relative in candidates {
            self.reparse_agent_file(project_id, &project_root, &relative).await?;
        }

        discovery_db::list_agents(&self.pool, project_id).await
    }

    async fn reparse_agent_file(&self, project_id: Uuid, project_root: &Path, relative: &Path) -> AppResult<()> {
        let relative_str = relative.to_string_lossy().into_owned();
        let absolute = project_root.join(relative);

        let existing = discovery_db::get_agent(&self.pool, project_id, &relative_str).await?;

        let content = match tokio::fs::read_to_string(&absolute).await {
            Ok(content) => content,
            Err(err) => {
                return self
                    .record_broken(project_id, &relative_str, existing, format!("could not read file: {err}"))
                    .await;
            }
        };

        if !parser::looks_like_agent_file(&content) {
            return Ok(());
        }

        let filename_stem = relative.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        match parser::parse_agent(&content, &filename_stem) {
            Ok(parsed) => {
                let agent = Agent {
                    id: existing.as_ref().map_or_else(Uuid::new_v4, |a| a.id),
                    project_id,
                    relative_path: relative_str,
                    name: parsed.name,
                    icon: parsed.icon,
                    file_hash: parsed.file_hash,
                    toolkit: parsed.toolkit,
                    raw_frontmatter: parsed.raw_frontmatter,
                    state: AgentState::Fresh,
                    updated_at: Utc::now(),
                };
                discovery_db::upsert_agent(&self.pool, &agent).await
            }
            Err(err) => self.record_broken(project_id, &relative_str, existing, err.to_string()).await,
        }
    }

    async fn record_broken(
        &self,
        project_id: Uuid,
        relative_path: &str,
        existing: Option<Agent>,
        error: String,
    ) -> AppResult<()> {
        let agent = Agent {
            id: existing.as_ref().map_or_else(Uuid::new_v4, |a| a.id),
            project_id,
            relative_path: relative_path.to_string(),
            name: existing.as_ref().map_or_else(|| relative_path.to_string(), |a| a.name.clone()),
            icon: existing.as_ref().and_then(|a| a.icon.clone()),
            file_hash: existing.as_ref().map_or_else(String::new, |a| a.file_hash.clone()),
            toolkit: existing.as_ref().map_or_else(AgentToolkit::default, |a| a.toolkit.clone()),
            raw_frontmatter: existing.as_ref().map_or(serde_json::Value::Null, |a| a.raw_frontmatter.clone()),
            state: AgentState::Broken { error },
            updated_at: Utc::now(),
        };
        discovery_db::upsert_agent(&self.pool, &agent).await
    }

    /// `GET /api/discovery/agents/{id}/toolkit`.
    ///
    /// # Errors
    /// Returns [`AppError::WorkspaceMismatch`] on tenancy mismatch or
    /// propagates a database failure.
    pub async fn get_agent_toolkit(&self, workspace_id: Uuid, agent_id: Uuid) -> AppResult<AgentToolkit> {
        let (agent, _project, _folder) = self.load_agent_chain(workspace_id, agent_id).await?;
        Ok(agent.toolkit)
    }

    /// `PUT /api/discovery/agents/{id}/toolkit` — write-back:
    /// update the DB row inside a transaction, then rewrite only the
    /// `hub.toolkit` subtree of the backing file atomically
    /// (write-to-temp + rename). If the file write fails the DB change is
    /// rolled back; if the DB commit fails after a successful file write,
    /// the previous file bytes are restored best-effort.
    ///
    /// # Errors
    /// Returns [`AppError::WorkspaceMismatch`] on tenancy mismatch,
    /// [`AppError::FrontmatterWriteFailed`] if the file could not be
    /// written (and, if restoration also failed, `reconcile_needed: true`),
    /// or propagates a database failure.
    pub async fn update_agent_toolkit(
        &self,
        workspace_id: Uuid,
        agent_id: Uuid,
        new_toolkit: AgentToolkit,
        actor_email: Option<&str>,
    ) -> AppResult<AgentToolkit> {
        let (agent, project, folder) = self.load_agent_chain(workspace_id, agent_id).await?;
        let absolute_path = PathBuf::from(&project.absolute_path).join(&agent.relative_path);

        let mut toolkit = new_toolkit;
        toolkit.last_configured = Some(Utc::now());
        toolkit.configured_by = actor_email.map(str::to_string);

        let original_content = tokio::fs::read_to_string(&absolute_path)
            .await
            .map_err(|e| AppError::Internal(format!("could not read agent file: {e}")))?;

        let new_content = writeback::write_toolkit(&original_content, agent.icon.as_deref(), &toolkit)?;
        let new_hash = parser::hash_bytes(new_content.as_bytes());

        let mut tx = self.pool.begin().await.map_err(AppError::from)?;
        let updated_agent = Agent {
            toolkit: toolkit.clone(),
            file_hash: new_hash,
            state: AgentState::Fresh,
            updated_at: Utc::now(),
            ..agent.clone()
        };
        if let Err(db_err) = upsert_agent_in_tx(&mut tx, &updated_agent).await {
            let _ = tx.rollback().await;
            return Err(db_err);
        }

        if let Err(file_err) = atomic_write(&absolute_path, &new_content).await {
            let _ = tx.rollback().await;
            self.audit.record(AuditDraft {
                workspace_id: Some(workspace_id),
                actor: AuditActor { user_id: None, email: actor_email.map(str::to_string) },
                category: AuditCategory::Workspace,
                action: "discovery.toolkit_write_failed".to_string(),
                target: AuditTarget { target_type: "agent".to_string(), id: Some(agent.id.to_string()), name: Some(agent.name.clone()) },
                success: false,
                error_message: Some(file_err.to_string()),
            });
            return Err(AppError::FrontmatterWriteFailed { reconcile_needed: false });
        }

        if let Err(commit_err) = tx.commit().await {
            tracing::error!(error = %commit_err, agent_id = %agent_id, "toolkit db commit failed after file write succeeded, restoring previous file bytes");
            let restore_ok = atomic_write(&absolute_path, &original_content).await.is_ok();
            self.audit.record(AuditDraft {
                workspace_id: Some(workspace_id),
                actor: AuditActor { user_id: None, email: actor_email.map(str::to_string) },
                category: AuditCategory::Workspace,
                action: "discovery.toolkit_write_failed".to_string(),
                target: AuditTarget { target_type: "agent".to_string(), id: Some(agent.id.to_string()), name: Some(agent.name.clone()) },
                success: false,
                error_message: Some(format!("db commit failed: {commit_err}")),
            });
            return Err(AppError::FrontmatterWriteFailed { reconcile_needed: !restore_ok });
        }

        let _ = folder;
        Ok(toolkit)
    }

    async fn load_agent_chain(&self, workspace_id: Uuid, agent_id: Uuid) -> AppResult<(Agent, Project, BaseFolder)> {
        let agent = discovery_db::get_agent_by_id(&self.pool, agent_id)
            .await?
            .ok_or_else(|| AppError::Internal("agent not found".to_string()))?;
        let project = discovery_db::get_project(&self.pool, agent.project_id)
            .await?
            .ok_or_else(|| AppError::Internal("project not found".to_string()))?;
        let folder = discovery_db::get_base_folder(&self.pool, project.base_folder_id)
            .await?
            .ok_or_else(|| AppError::Internal("base folder not found".to_string()))?;
        assert_same_workspace(folder.workspace_id, workspace_id)?;
        Ok((agent, project, folder))
    }

    /// Handle a debounced filesystem-watch event for `changed_path`: mark
    /// the matching `Agent` dirty, then reparse it. A path outside any
    /// known project's agents directory is ignored.
    ///
    /// # Errors
    /// Propagates any database failure.
    pub async fn handle_watch_event(&self, changed_path: &Path) -> AppResult<()> {
        let Some((project_id, project_root, relative)) = self.resolve_watched_path(changed_path).await? else {
            return Ok(());
        };
        if let Some(existing) = discovery_db::get_agent(&self.pool, project_id, &relative.to_string_lossy()).await? {
            discovery_db::mark_dirty(&self.pool, existing.id).await?;
        }
        self.reparse_agent_file(project_id, &project_root, &relative).await
    }

    async fn resolve_watched_path(&self, changed_path: &Path) -> AppResult<Option<(Uuid, PathBuf, PathBuf)>> {
        let folders = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM base_folders")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        for (folder_id,) in folders {
            let folder = discovery_db::get_base_folder(&self.pool, folder_id).await?;
            let Some(folder) = folder else { continue };
            let projects = discovery_db::list_projects(&self.pool, folder.id).await?;
            for project in projects {
                let project_root = PathBuf::from(&project.absolute_path);
                if let Ok(relative) = changed_path.strip_prefix(&project_root) {
                    if relative.starts_with(scanner::AGENTS_DIR_NAME) && relative.extension().and_then(|e| e.to_str()) == Some("md") {
                        return Ok(Some((project.id, project_root, relative.to_path_buf())));
                    }
                }
            }
        }
        Ok(None)
    }
}

async fn upsert_agent_in_tx(tx: &mut sqlx::Transaction<'_, Sqlite>, agent: &Agent) -> AppResult<()> {
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
    .execute(&mut **tx)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

async fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let temp_path = path.with_extension("hub-write-tmp");
    tokio::fs::write(&temp_path, content).await?;
    tokio::fs::rename(&temp_path, path).await
}

/// Spawn the background task that drains debounced filesystem events from
/// an [`watcher::AgentWatcher`] and feeds them to [`DiscoveryService::handle_watch_event`].
pub fn spawn_watch_loop(
    service: Arc<DiscoveryService>,
    mut events: tokio::sync::mpsc::UnboundedReceiver<PathBuf>,
) {
    tokio::spawn(async move {
        while let Some(path) = events.recv().await {
            if let Err(err) = service.handle_watch_event(&path).await {
                tracing::warn!(path = %path.display(), error = %err, "failed to reparse agent after filesystem change");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_store;
    use hub_core::models::discovery::AgentToolGrant;

    fn write_agent_file(project_root: &Path, relative: &str, body: &str) {
        let path = project_root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        std::fs::write(path, body).expect("write");
    }

    async fn seeded_service_with_project() -> (DiscoveryService, Uuid, Uuid, tempfile::TempDir) {
        let store = test_store().await;
        let audit = AuditSink::spawn(store.pool().clone());
        let service = DiscoveryService::new(store.pool().clone(), audit);

        let workspace_id = Uuid::new_v4();
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".git")).expect("git dir");
        write_agent_file(
            dir.path(),
            "agents/reviewer.md",
            "---\nname: reviewer\nhub:\n  toolkit:\n    tools:\n    - name: a\n---\nBody.\n",
        );

        let folder = service
            .create_base_folder(workspace_id, &dir.path().to_string_lossy(), "repo root")
            .await
            .expect("create base folder");
        service.sync_base_folder(workspace_id, folder.id).await.expect("sync");

        let projects = service.list_projects(workspace_id, folder.id).await.expect("list projects");
        let project_id = projects[0].id;
        (service, workspace_id, project_id, dir)
    }

    #[tokio::test]
    async fn scanning_a_base_folder_discovers_the_project_and_its_agent() {
        let (service, workspace_id, project_id, _dir) = seeded_service_with_project().await;
        let agents = discovery_db::list_agents(service_pool(&service), project_id).await.expect("list agents");
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "reviewer");
        assert_eq!(agents[0].state, AgentState::Fresh);
        assert_eq!(agents[0].toolkit.tools[0].name, "a");
        let _ = workspace_id;
    }

    #[tokio::test]
    async fn toolkit_write_back_updates_db_and_file_leaving_other_keys_intact() {
        let (service, workspace_id, project_id, dir) = seeded_service_with_project().await;
        let agents = discovery_db::list_agents(service_pool(&service), project_id).await.expect("list agents");
        let agent_id = agents[0].id;

        let new_toolkit = AgentToolkit {
            tools: vec![
                AgentToolGrant { name: "a".to_string(), permissions: vec![] },
                AgentToolGrant { name: "b".to_string(), permissions: vec![] },
            ],
            inherit_project_tools: true,
            last_configured: None,
            configured_by: None,
        };
        let result = service
            .update_agent_toolkit(workspace_id, agent_id, new_toolkit, Some("admin@acme.test"))
            .await
            .expect("write back");
        assert_eq!(result.tools.len(), 2);

        let on_disk = std::fs::read_to_string(dir.path().join("agents/reviewer.md")).expect("read back");
        assert!(on_disk.contains("name: reviewer"));
        assert!(on_disk.contains("- name: b"));
        assert!(on_disk.contains("Body."));
    }

    #[tokio::test]
    async fn cross_workspace_toolkit_access_is_rejected() {
        let (service, _workspace_id, project_id, _dir) = seeded_service_with_project().await;
        let agents = discovery_db::list_agents(service_pool(&service), project_id).await.expect("list agents");
        let agent_id = agents[0].id;

        let err = service
            .get_agent_toolkit(Uuid::new_v4(), agent_id)
            .await
            .expect_err("must reject foreign workspace");
        assert!(matches!(err, AppError::WorkspaceMismatch));
    }

    fn service_pool(service: &DiscoveryService) -> &Pool<Sqlite> {
        &service.pool
    }
}
