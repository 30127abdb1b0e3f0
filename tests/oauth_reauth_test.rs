// ABOUTME: Integration coverage for the Credential Vault's OAuth flow (C8)
// ABOUTME: Covers first-activation NeedsOAuth, transparent refresh, and ReauthRequired on insufficient scope
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use hub_core::errors::AppError;
use hub_core::models::credential::{Credential, CredentialKind};
use hub_mcp_server::database::credential;
use hub_mcp_server::vault::Vault;
use uuid::Uuid;

const REDIRECT_URI: &str = "https://hub.test/api/credentials/callback";

fn scopes(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn first_call_with_no_grant_returns_needs_oauth_with_an_authorize_url() {
    let (store, _dir) = common::test_store().await;
    let crypto = common::test_crypto();
    let mut providers: HashMap<String, Arc<dyn hub_mcp_server::vault::OAuthProvider>> = HashMap::new();
    providers.insert(
        "google".to_string(),
        Arc::new(common::StubOAuthProvider::new(scopes(&["gmail.readonly"]))),
    );
    let vault = Vault::new(store.pool().clone(), Arc::clone(&crypto), providers);

    let workspace_id = common::new_workspace_id();
    let user_id = Uuid::new_v4();

    let err = vault
        .get_oauth(workspace_id, user_id, "google", &scopes(&["gmail.readonly"]), REDIRECT_URI)
        .await
        .expect_err("no grant exists yet");

    match err {
        AppError::NeedsOAuth { provider, authorize_url, .. } => {
            assert_eq!(provider, "google");
            assert!(authorize_url.starts_with("https://provider.test/authorize"));
        }
        other => panic!("expected NeedsOAuth, got {other:?}"),
    }
}

#[tokio::test]
async fn a_valid_grant_covering_the_requested_scopes_returns_the_access_token_directly() {
    let (store, _dir) = common::test_store().await;
    let crypto = common::test_crypto();
    let workspace_id = common::new_workspace_id();
    let user_id = Uuid::new_v4();

    let credential = Credential {
        id: Uuid::new_v4(),
        workspace_id,
        user_id,
        provider: "google".to_string(),
        kind: CredentialKind::Oauth2,
        secret: None,
        access_token: Some(crypto.seal_to_base64("live-access-token").expect("seal")),
        refresh_token: Some(crypto.seal_to_base64("refresh-token").expect("seal")),
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        scopes: scopes(&["gmail.readonly"]),
        issued_at: Utc::now(),
    };
    credential::upsert(store.pool(), &credential).await.expect("seed credential");

    let providers: HashMap<String, Arc<dyn hub_mcp_server::vault::OAuthProvider>> = HashMap::new();
    let vault = Vault::new(store.pool().clone(), Arc::clone(&crypto), providers);

    let token = vault
        .get_oauth(workspace_id, user_id, "google", &scopes(&["gmail.readonly"]), REDIRECT_URI)
        .await
        .expect("token still valid");
    assert_eq!(token, "live-access-token");
}

#[tokio::test]
async fn an_expired_but_refreshable_grant_is_transparently_refreshed() {
    let (store, _dir) = common::test_store().await;
    let crypto = common::test_crypto();
    let workspace_id = common::new_workspace_id();
    let user_id = Uuid::new_v4();

    let credential = Credential {
        id: Uuid::new_v4(),
        workspace_id,
        user_id,
        provider: "google".to_string(),
        kind: CredentialKind::Oauth2,
        secret: None,
        access_token: Some(crypto.seal_to_base64("stale-access-token").expect("seal")),
        refresh_token: Some(crypto.seal_to_base64("refresh-token").expect("seal")),
        expires_at: Some(Utc::now() - chrono::Duration::minutes(5)),
        scopes: scopes(&["gmail.readonly"]),
        issued_at: Utc::now() - chrono::Duration::days(1),
    };
    credential::upsert(store.pool(), &credential).await.expect("seed credential");

    let mut providers: HashMap<String, Arc<dyn hub_mcp_server::vault::OAuthProvider>> = HashMap::new();
    providers.insert(
        "google".to_string(),
        Arc::new(common::StubOAuthProvider::new(scopes(&["gmail.readonly"]))),
    );
    let vault = Vault::new(store.pool().clone(), Arc::clone(&crypto), providers);

    let token = vault
        .get_oauth(workspace_id, user_id, "google", &scopes(&["gmail.readonly"]), REDIRECT_URI)
        .await
        .expect("refreshed transparently");
    assert_eq!(token, "access-token-2");
}

#[tokio::test]
async fn a_grant_missing_a_newly_required_scope_forces_reauth_instead_of_refresh() {
    let (store, _dir) = common::test_store().await;
    let crypto = common::test_crypto();
    let workspace_id = common::new_workspace_id();
    let user_id = Uuid::new_v4();

    let credential = Credential {
        id: Uuid::new_v4(),
        workspace_id,
        user_id,
        provider: "google".to_string(),
        kind: CredentialKind::Oauth2,
        secret: None,
        access_token: Some(crypto.seal_to_base64("live-access-token").expect("seal")),
        refresh_token: Some(crypto.seal_to_base64("refresh-token").expect("seal")),
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        scopes: scopes(&["gmail.readonly"]),
        issued_at: Utc::now(),
    };
    credential::upsert(store.pool(), &credential).await.expect("seed credential");

    let mut providers: HashMap<String, Arc<dyn hub_mcp_server::vault::OAuthProvider>> = HashMap::new();
    providers.insert(
        "google".to_string(),
        Arc::new(common::StubOAuthProvider::new(scopes(&["gmail.readonly"]))),
    );
    let vault = Vault::new(store.pool().clone(), Arc::clone(&crypto), providers);

    let err = vault
        .get_oauth(
            workspace_id,
            user_id,
            "google",
            &scopes(&["gmail.readonly", "gmail.send"]),
            REDIRECT_URI,
        )
        .await
        .expect_err("grant does not cover gmail.send");

    match err {
        AppError::ReauthRequired { provider, scopes: missing, authorize_url } => {
            assert_eq!(provider, "google");
            assert!(missing.iter().any(|s| s == "gmail.send"));
            assert!(authorize_url.starts_with("https://provider.test/authorize"));
        }
        other => panic!("expected ReauthRequired, got {other:?}"),
    }
}

#[tokio::test]
async fn cross_workspace_access_to_another_workspaces_credential_is_rejected() {
    let (store, _dir) = common::test_store().await;
    let crypto = common::test_crypto();
    let owner_workspace_id = common::new_workspace_id();
    let user_id = Uuid::new_v4();

    let credential = Credential {
        id: Uuid::new_v4(),
        workspace_id: owner_workspace_id,
        user_id,
        provider: "google".to_string(),
        kind: CredentialKind::Oauth2,
        secret: None,
        access_token: Some(crypto.seal_to_base64("live-access-token").expect("seal")),
        refresh_token: None,
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        scopes: scopes(&["gmail.readonly"]),
        issued_at: Utc::now(),
    };
    credential::upsert(store.pool(), &credential).await.expect("seed credential");

    let providers: HashMap<String, Arc<dyn hub_mcp_server::vault::OAuthProvider>> = HashMap::new();
    let vault = Vault::new(store.pool().clone(), Arc::clone(&crypto), providers);

    let other_workspace_id = common::new_workspace_id();
    let err = vault
        .get_oauth(other_workspace_id, user_id, "google", &scopes(&["gmail.readonly"]), REDIRECT_URI)
        .await
        .expect_err("workspace mismatch");
    assert!(matches!(err, AppError::WorkspaceMismatch));
}
