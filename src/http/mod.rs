// ABOUTME: MCP Front Door (C13) — Axum router, middleware chain, and one HTTP surface per §6.2
// ABOUTME: Grounded in the teacher's mcp/http_setup.rs route wiring and axum-based routes/admin/mod.rs layering style

mod admin;
mod audit_logs;
mod auth;
mod credentials;
mod discovery;
mod health;
mod mcp;
mod middleware;
mod setup;
mod tools;
mod workspace;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::activation::ActivationManager;
use crate::audit::AuditSink;
use crate::config::HubConfig;
use crate::crypto::Crypto;
use crate::database::Store;
use crate::discovery::watcher::AgentWatcher;
use crate::discovery::DiscoveryService;
use crate::identity::local::LocalAuthenticator;
use crate::identity::workos::{RealWorkosProvider, WorkosAuthenticator};
use crate::mode::ModeManager;
use crate::proxy::ToolProxy;
use crate::registry::ToolRegistry;
use crate::vault::Vault;

/// Everything a handler might need, shared behind one `Arc` per the
/// teacher's `ServerResources`/`AdminApiContext` convention of one
/// application-wide context struct rather than per-route state.
pub struct AppState {
    pub mode_manager: ModeManager,
    pub store: Arc<Store>,
    pub crypto: Arc<Crypto>,
    pub local_auth: LocalAuthenticator,
    pub workos_auth: WorkosAuthenticator<RealWorkosProvider>,
    pub activation: Arc<ActivationManager>,
    pub registry: Arc<ToolRegistry>,
    pub vault: Arc<Vault>,
    pub discovery: Arc<DiscoveryService>,
    pub proxy: Arc<ToolProxy>,
    pub audit: AuditSink,
    pub public_base_url: String,
    pub started_at: Instant,
    /// Kept alive for the process's lifetime; new `BaseFolder`s are added to
    /// it as they're registered. `None` if the initial watch setup failed
    /// (e.g. an unwatchable root at startup) — discovery still works via
    /// explicit `sync` calls, just without hot reload.
    pub watcher: Option<tokio::sync::Mutex<AgentWatcher>>,
}

/// Build the full Axum router: MCP transport, setup, auth, tool management,
/// credentials, discovery, audit log, health, and static UI assets.
///
/// Middleware is layered outside-in per §4.13: request id → access log →
/// mode gate → authenticator → workspace resolver → CSRF → handler. The
/// mode gate and authenticator are folded into one [`middleware::auth_middleware`]
/// since both need the current [`hub_core::models::system_config::AppMode`]
/// in the same request.
#[must_use]
pub fn router(state: Arc<AppState>, hub_config: &HubConfig) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/api/setup/status", get(setup::status))
        .route("/api/setup/local", post(setup::configure_local))
        .route("/api/setup/workos", post(setup::configure_workos))
        .route("/api/setup/upgrade-to-workos", post(setup::upgrade_to_workos))
        .route("/api/auth/authorize", get(auth::authorize))
        .route("/api/auth/callback", post(auth::callback))
        .route("/api/credentials/callback", post(credentials::oauth_callback));

    let protected = Router::new()
        .route("/mcp", post(mcp::handle_mcp))
        .route("/mcp/sse", get(mcp::handle_sse))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/catalogue", get(tools::catalogue))
        .route("/api/tools", get(tools::list_active).post(tools::activate))
        .route("/api/tools/:tool_name", delete(tools::deactivate))
        .route(
            "/api/tools/:tool_name/config",
            get(tools::get_config).put(tools::update_config),
        )
        .route("/api/credentials/:provider", put(credentials::put_api_key).delete(credentials::revoke))
        .route("/api/credentials/:provider/oauth/start", post(credentials::start_oauth))
        .route("/api/discovery/base-folders", get(discovery::list_base_folders).post(discovery::create_base_folder))
        .route(
            "/api/discovery/base-folders/:base_folder_id/sync",
            post(discovery::sync_base_folder),
        )
        .route("/api/discovery/projects", get(discovery::list_projects))
        .route("/api/discovery/projects/:project_id/sync", post(discovery::sync_project))
        .route(
            "/api/discovery/agents/:agent_id/toolkit",
            get(discovery::get_agent_toolkit).put(discovery::update_agent_toolkit),
        )
        .route("/api/audit-logs", get(audit_logs::list))
        .route("/api/workspace", get(workspace::get_current))
        .route("/api/admin/workspaces", get(admin::list_workspaces))
        .route("/api/admin/registry/refresh", post(admin::refresh_registry))
        .route("/api/admin/status", get(admin::status))
        .layer(axum::middleware::from_fn(middleware::csrf_middleware))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::auth_middleware));

    let static_assets = ServeDir::new(&hub_config.static_assets_dir);

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .fallback_service(static_assets)
        .with_state(state)
}
