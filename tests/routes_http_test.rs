// ABOUTME: HTTP-layer coverage for the Axum front door (C13) — drives http::router() itself, not the services underneath it
// ABOUTME: Covers the zero-config local bootstrap and the activate-then-call-a-tool flow as literal HTTP requests
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;
mod helpers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::Router;
use hub_mcp_server::activation::ActivationManager;
use hub_mcp_server::audit::AuditSink;
use hub_mcp_server::config::HubConfig;
use hub_mcp_server::discovery::DiscoveryService;
use hub_mcp_server::http::{router, AppState};
use hub_mcp_server::identity::local::LocalAuthenticator;
use hub_mcp_server::identity::workos::{RealWorkosProvider, WorkosAuthenticator};
use hub_mcp_server::mode::ModeManager;
use hub_mcp_server::proxy::ToolProxy;
use hub_mcp_server::registry::ToolRegistry;
use hub_mcp_server::vault::Vault;
use sha2::{Digest, Sha256};

use helpers::axum_test::AxumTestRequest;

const SESSION_COOKIE_NAME: &str = "hub_session";

fn descriptors_dir() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/tools")
}

fn static_assets_dir() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/ui")
}

fn hub_config() -> HubConfig {
    HubConfig {
        host: "127.0.0.1".to_string(),
        port: 8080,
        database_path: "hub.sqlite3".to_string(),
        tool_descriptors_dir: descriptors_dir(),
        static_assets_dir: static_assets_dir(),
        public_base_url: Some("https://hub.test".to_string()),
    }
}

/// Reproduces `src/http/middleware.rs`'s private `csrf_token_for`, which an
/// external test crate can't call directly.
fn csrf_token_for(session_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_token.as_bytes());
    hasher.update(b"csrf");
    hex::encode(hasher.finalize())
}

async fn build_app() -> (Router, tempfile::TempDir) {
    let (store, dir) = common::test_store().await;
    let store = Arc::new(store);
    let pool = store.pool().clone();
    let crypto = common::test_crypto();

    let registry = Arc::new(ToolRegistry::new(pool.clone(), descriptors_dir()));
    registry.refresh().await.expect("refresh registry");

    let audit = AuditSink::spawn(pool.clone());
    let vault = Arc::new(Vault::new(pool.clone(), Arc::clone(&crypto), HashMap::new()));
    let activation = Arc::new(ActivationManager::new(
        pool.clone(),
        Arc::clone(&crypto),
        Arc::clone(&registry),
        Arc::clone(&vault),
        audit.clone(),
    ));
    let proxy = Arc::new(ToolProxy::new(
        pool.clone(),
        Arc::clone(&activation),
        Arc::clone(&vault),
        "https://hub.test/api/credentials/callback".to_string(),
    ));

    let mode_manager = ModeManager::new(pool.clone());
    let local_auth = LocalAuthenticator::new(pool.clone());
    let workos_auth = WorkosAuthenticator::new(pool.clone(), RealWorkosProvider::default());
    let discovery = Arc::new(DiscoveryService::new(store.discovery_pool().clone(), audit.clone()));

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
        public_base_url: "https://hub.test".to_string(),
        started_at: Instant::now(),
        watcher: None,
    });

    (router(state, &hub_config()), dir)
}

/// S1 — a brand-new Hub reports `UNCONFIGURED`, a local admin bootstrap
/// flips it to `LOCAL`, and the catalogue becomes reachable.
#[tokio::test]
async fn zero_config_local_bootstrap_over_http() {
    let (app, _dir) = build_app().await;

    let status = AxumTestRequest::get("/api/setup/status").send(app.clone()).await.assert_status(StatusCode::OK);
    let body: serde_json::Value = status.json();
    assert_eq!(body["mode"], "unconfigured");
    assert_eq!(body["is_setup_required"], true);

    AxumTestRequest::post("/api/setup/local")
        .json(&serde_json::json!({"admin_email": "admin@acme.test"}))
        .send(app.clone())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let status = AxumTestRequest::get("/api/setup/status").send(app.clone()).await.assert_status(StatusCode::OK);
    let body: serde_json::Value = status.json();
    assert_eq!(body["mode"], "local");
    assert_eq!(body["is_setup_required"], false);

    let catalogue = AxumTestRequest::get("/api/catalogue").send(app).await.assert_status(StatusCode::OK);
    let tools: Vec<serde_json::Value> = catalogue.json();
    assert!(tools.iter().any(|tool| tool["tool_name"] == "wait"));
}

/// S2 — once a tool is activated, `POST /mcp` can call it and gets back
/// exactly one terminal JSON-RPC response frame.
#[tokio::test]
async fn activate_then_call_the_wait_tool_over_mcp() {
    let (app, _dir) = build_app().await;

    AxumTestRequest::post("/api/setup/local")
        .json(&serde_json::json!({"admin_email": "admin@acme.test"}))
        .send(app.clone())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    // First protected request issues a session cookie; the CSRF token for
    // every state-changing request after this one is derived from it.
    let bootstrap = AxumTestRequest::get("/api/catalogue").send(app.clone()).await.assert_status(StatusCode::OK);
    let session_cookie = bootstrap.session_cookie(SESSION_COOKIE_NAME).expect("session cookie issued");
    let session_token = session_cookie.trim_start_matches(&format!("{SESSION_COOKIE_NAME}=")).to_string();
    let csrf_token = csrf_token_for(&session_token);

    AxumTestRequest::post("/api/tools")
        .header("cookie", &session_cookie)
        .header("x-csrf-token", &csrf_token)
        .json(&serde_json::json!({"tool_name": "wait", "config": {}}))
        .send(app.clone())
        .await
        .assert_status(StatusCode::OK);

    let mcp_response = AxumTestRequest::post("/mcp")
        .header("cookie", &session_cookie)
        .header("x-csrf-token", &csrf_token)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "wait.sleep", "arguments": {"seconds": 0}},
        }))
        .send(app)
        .await
        .assert_status(StatusCode::OK);

    let frames: Vec<serde_json::Value> = mcp_response
        .text()
        .lines()
        .map(|line| serde_json::from_str(line).expect("each frame is valid JSON"))
        .collect();

    assert_eq!(frames.len(), 1, "exactly one terminal response frame, no progress notifications");
    assert_eq!(frames[0]["id"], 1);
    assert!(frames[0]["error"].is_null(), "expected a result, got {:?}", frames[0]);
    assert!(frames[0]["result"]["content"].is_array());
}
