// ABOUTME: Process entry point — parses bootstrap config, wires C1-C14, and serves the Axum front door
// ABOUTME: Everything here runs once at startup; steady-state configuration lives in SystemConfig, not this binary
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use hub_mcp_server::activation::ActivationManager;
use hub_mcp_server::audit::AuditSink;
use hub_mcp_server::config::HubConfig;
use hub_mcp_server::crypto::Crypto;
use hub_mcp_server::database::{system_config, Store};
use hub_mcp_server::discovery::watcher::AgentWatcher;
use hub_mcp_server::discovery::{spawn_watch_loop, DiscoveryService};
use hub_mcp_server::http::{router, AppState};
use hub_mcp_server::identity::local::LocalAuthenticator;
use hub_mcp_server::identity::workos::{RealWorkosProvider, WorkosAuthenticator};
use hub_mcp_server::mode::ModeManager;
use hub_mcp_server::proxy::ToolProxy;
use hub_mcp_server::registry::ToolRegistry;
use hub_mcp_server::vault::{GenericOAuthProvider, OAuthProvider, Vault};

/// Build the OAuth provider catalog from environment variables, one set per
/// provider the installed tools' descriptors require. A provider named by
/// `required_oauth` (e.g. `"google"`) is wired up if and only if
/// `HUB_OAUTH_<PROVIDER>_CLIENT_ID` and `..._CLIENT_SECRET` are both set;
/// tools requiring an unconfigured provider simply fail `start_oauth` with
/// `AppError::Internal` at the point they're activated, rather than
/// blocking every other tool's startup.
fn oauth_providers_from_env(provider_names: &std::collections::BTreeSet<String>) -> HashMap<String, Arc<dyn OAuthProvider>> {
    let http = reqwest::Client::new();
    let mut providers: HashMap<String, Arc<dyn OAuthProvider>> = HashMap::new();

    for name in provider_names {
        let upper = name.to_uppercase().replace('-', "_");
        let client_id = std::env::var(format!("HUB_OAUTH_{upper}_CLIENT_ID"));
        let client_secret = std::env::var(format!("HUB_OAUTH_{upper}_CLIENT_SECRET"));
        let (Ok(client_id), Ok(client_secret)) = (client_id, client_secret) else {
            tracing::warn!(provider = %name, "no OAuth client credentials configured (HUB_OAUTH_{upper}_CLIENT_ID/_CLIENT_SECRET); tools requiring it will fail to start OAuth");
            continue;
        };
        let authorize_endpoint = std::env::var(format!("HUB_OAUTH_{upper}_AUTHORIZE_URL")).unwrap_or_default();
        let token_endpoint = std::env::var(format!("HUB_OAUTH_{upper}_TOKEN_URL")).unwrap_or_default();
        let revoke_endpoint = std::env::var(format!("HUB_OAUTH_{upper}_REVOKE_URL")).ok();

        if authorize_endpoint.is_empty() || token_endpoint.is_empty() {
            tracing::warn!(provider = %name, "HUB_OAUTH_{upper}_AUTHORIZE_URL/_TOKEN_URL not set; skipping provider");
            continue;
        }

        providers.insert(
            name.clone(),
            Arc::new(GenericOAuthProvider::new(
                http.clone(),
                client_id,
                client_secret,
                authorize_endpoint,
                token_endpoint,
                revoke_endpoint,
            )),
        );
    }

    providers
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hub_mcp_server::logging::init();

    let hub_config = HubConfig::load();
    tracing::info!(
        host = %hub_config.host,
        port = hub_config.port,
        database_path = %hub_config.database_path,
        "starting mcp tool hub"
    );

    let store = Arc::new(Store::connect(&hub_config.database_url()).await?);
    let pool = store.pool().clone();

    let config_row = system_config::load_or_init(&pool).await?;
    let crypto = Arc::new(Crypto::derive(&config_row.encryption_salt));

    let public_base_url = hub_config.public_base_url();
    system_config::set(&pool, "bind_host", &hub_config.host, false).await?;
    system_config::set(&pool, "bind_port", &hub_config.port.to_string(), false).await?;
    system_config::set(&pool, "database_path", &hub_config.database_path, false).await?;
    system_config::set(&pool, "hub_base_url", &public_base_url, false).await?;

    let audit = AuditSink::spawn(pool.clone());

    let registry = Arc::new(ToolRegistry::new(pool.clone(), hub_config.tool_descriptors_dir.clone()));
    let descriptor_count = registry.refresh().await?;
    tracing::info!(descriptor_count, "tool registry populated");

    let required_oauth_providers: std::collections::BTreeSet<String> = registry
        .list_catalogue()
        .await
        .into_iter()
        .flat_map(|entry| entry.required_oauth)
        .collect();
    let oauth_providers = oauth_providers_from_env(&required_oauth_providers);

    let vault = Arc::new(Vault::new(pool.clone(), Arc::clone(&crypto), oauth_providers));
    let activation = Arc::new(ActivationManager::new(
        pool.clone(),
        Arc::clone(&crypto),
        Arc::clone(&registry),
        Arc::clone(&vault),
        audit.clone(),
    ));

    let mode_manager = ModeManager::new(pool.clone());
    let local_auth = LocalAuthenticator::new(pool.clone());
    let workos_auth = WorkosAuthenticator::new(pool.clone(), RealWorkosProvider::default());

    let discovery = Arc::new(DiscoveryService::new(store.discovery_pool().clone(), audit.clone()));

    let proxy = Arc::new(ToolProxy::new(
        pool.clone(),
        Arc::clone(&activation),
        Arc::clone(&vault),
        format!("{public_base_url}/api/credentials/callback"),
    ));

    let watch_roots: Vec<std::path::PathBuf> = discovery
        .list_all_base_folders()
        .await?
        .into_iter()
        .map(|folder| std::path::PathBuf::from(folder.path))
        .collect();
    let watcher = match AgentWatcher::spawn(&watch_roots) {
        Ok((watcher, events)) => {
            spawn_watch_loop(Arc::clone(&discovery), events);
            Some(tokio::sync::Mutex::new(watcher))
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to start agent-discovery filesystem watcher; hot reload disabled, explicit sync still works");
            None
        }
    };

    let state = Arc::new(AppState {
        mode_manager,
        store: Arc::clone(&store),
        crypto,
        local_auth,
        workos_auth,
        activation,
        registry,
        vault,
        discovery,
        proxy,
        audit,
        public_base_url,
        started_at: Instant::now(),
        watcher,
    });

    let app = router(state, &hub_config);
    let addr = hub_config.socket_addr()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Waits for SIGINT (Ctrl-C) or, on unix, SIGTERM, so the process shuts down
/// cleanly under a process supervisor instead of dropping in-flight
/// connections.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
