// ABOUTME: Integration coverage for the bootstrap state machine (C4)
// ABOUTME: Exercises the UNCONFIGURED -> LOCAL | WORKOS transitions against a real migrated database
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use async_trait::async_trait;
use hub_core::errors::AppError;
use hub_core::models::system_config::AppMode;
use hub_mcp_server::mode::{ModeManager, WorkosParams, WorkosValidator};

struct AcceptingValidator;

#[async_trait]
impl WorkosValidator for AcceptingValidator {
    async fn validate(&self, _params: &WorkosParams) -> hub_core::errors::AppResult<()> {
        Ok(())
    }
}

struct RejectingValidator;

#[async_trait]
impl WorkosValidator for RejectingValidator {
    async fn validate(&self, _params: &WorkosParams) -> hub_core::errors::AppResult<()> {
        Err(AppError::Internal("invalid client credentials".to_string()))
    }
}

fn sample_params() -> WorkosParams {
    WorkosParams {
        client_id: "client_123".to_string(),
        api_key: "sk_test_xyz".to_string(),
        authkit_domain: "acme.authkit.app".to_string(),
        super_admin_emails: vec!["owner@acme.test".to_string()],
    }
}

#[tokio::test]
async fn fresh_database_starts_unconfigured() {
    let (store, _dir) = common::test_store().await;
    let manager = ModeManager::new(store.pool().clone());
    let (mode, needs_setup) = manager.status().await.expect("status");
    assert_eq!(mode, AppMode::Unconfigured);
    assert!(needs_setup);
}

#[tokio::test]
async fn configure_local_creates_the_sole_admin_and_transitions() {
    let (store, _dir) = common::test_store().await;
    let manager = ModeManager::new(store.pool().clone());

    let admin = manager.configure_local("admin@acme.test").await.expect("configure");
    assert!(admin.is_super_admin);

    let (mode, needs_setup) = manager.status().await.expect("status");
    assert_eq!(mode, AppMode::Local);
    assert!(!needs_setup);
}

#[tokio::test]
async fn configure_local_twice_is_rejected() {
    let (store, _dir) = common::test_store().await;
    let manager = ModeManager::new(store.pool().clone());

    manager.configure_local("admin@acme.test").await.expect("first configure");
    let err = manager
        .configure_local("someone-else@acme.test")
        .await
        .expect_err("second configure must fail");
    assert!(matches!(err, AppError::AlreadyConfigured));
}

#[tokio::test]
async fn configure_workos_rejects_a_provider_that_refuses_the_credentials() {
    let (store, _dir) = common::test_store().await;
    let manager = ModeManager::new(store.pool().clone());

    let err = manager
        .configure_workos(&RejectingValidator, &sample_params())
        .await
        .expect_err("provider rejected credentials");
    assert!(matches!(err, AppError::Internal(_)));

    let (mode, needs_setup) = manager.status().await.expect("status");
    assert_eq!(mode, AppMode::Unconfigured);
    assert!(needs_setup);
}

#[tokio::test]
async fn configure_workos_transitions_once_the_provider_accepts() {
    let (store, _dir) = common::test_store().await;
    let manager = ModeManager::new(store.pool().clone());

    manager
        .configure_workos(&AcceptingValidator, &sample_params())
        .await
        .expect("configure");

    let (mode, needs_setup) = manager.status().await.expect("status");
    assert_eq!(mode, AppMode::Workos);
    assert!(!needs_setup);
}

#[tokio::test]
async fn upgrade_to_workos_preserves_the_existing_workspace() {
    let (store, _dir) = common::test_store().await;
    let manager = ModeManager::new(store.pool().clone());

    manager.configure_local("admin@acme.test").await.expect("configure local");
    manager
        .upgrade_to_workos(&AcceptingValidator, &sample_params())
        .await
        .expect("upgrade");

    let (mode, _) = manager.status().await.expect("status");
    assert_eq!(mode, AppMode::Workos);
}

#[tokio::test]
async fn mode_never_transitions_backward() {
    let (store, _dir) = common::test_store().await;
    let manager = ModeManager::new(store.pool().clone());

    manager.configure_local("admin@acme.test").await.expect("configure local");
    manager
        .upgrade_to_workos(&AcceptingValidator, &sample_params())
        .await
        .expect("upgrade");

    let err = manager
        .configure_local("other@acme.test")
        .await
        .expect_err("cannot fall back to local once on workos");
    assert!(matches!(err, AppError::AlreadyConfigured));
}
