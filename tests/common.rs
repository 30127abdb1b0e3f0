// ABOUTME: Shared test utilities for integration tests
// ABOUTME: Builds a throwaway tempfile-backed Store so external tests/ exercises the real migration path
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hub_core::errors::AppResult;
use hub_mcp_server::crypto::Crypto;
use hub_mcp_server::database::Store;
use hub_mcp_server::vault::{OAuthProvider, ProviderTokenSet};
use uuid::Uuid;

/// Opens a fresh tempfile-backed database through the real `Store::connect`
/// path (not the in-memory `pub(crate)` helper the unit tests use, which
/// external integration tests can't reach), so migrations run exactly as
/// they would in production. The backing file is deleted once the
/// `TempDir` is dropped at the end of the test.
pub async fn test_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("hub.sqlite3");
    let store = Store::connect(&format!("sqlite:{}", path.display()))
        .await
        .expect("connect store");
    (store, dir)
}

#[must_use]
pub fn test_crypto() -> Arc<Crypto> {
    Arc::new(Crypto::from_raw_key([7u8; 32]))
}

/// A scripted OAuth provider standing in for a real tool provider (e.g.
/// Google) so OAuth-gated scenarios don't need network access.
pub struct StubOAuthProvider {
    pub granted_scopes: BTreeSet<String>,
}

impl StubOAuthProvider {
    #[must_use]
    pub fn new(granted_scopes: BTreeSet<String>) -> Self {
        Self { granted_scopes }
    }
}

#[async_trait]
impl OAuthProvider for StubOAuthProvider {
    fn authorize_url(&self, redirect_uri: &str, state: &str, _scopes: &BTreeSet<String>) -> String {
        format!("https://provider.test/authorize?state={state}&redirect_uri={redirect_uri}")
    }

    async fn exchange_code(&self, _code: &str, _redirect_uri: &str) -> AppResult<ProviderTokenSet> {
        Ok(ProviderTokenSet {
            access_token: "access-token-1".to_string(),
            refresh_token: Some("refresh-token-1".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            scopes: self.granted_scopes.clone(),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> AppResult<ProviderTokenSet> {
        Ok(ProviderTokenSet {
            access_token: "access-token-2".to_string(),
            refresh_token: Some("refresh-token-1".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            scopes: self.granted_scopes.clone(),
        })
    }

    async fn revoke(&self, _access_token: &str) -> AppResult<()> {
        Ok(())
    }
}

pub fn new_workspace_id() -> Uuid {
    Uuid::new_v4()
}
