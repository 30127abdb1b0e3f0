// ABOUTME: Activation Manager (C10) — (workspace, tool) enablement and per-user configuration
// ABOUTME: Validates config against the registry's JSON Schema, triggers OAuth, seals x-encrypted keys via Crypto

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use hub_core::errors::{AppError, AppResult};
use hub_core::models::tool::{AuthType, UserTool};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::audit::{AuditDraft, AuditSink};
use crate::crypto::Crypto;
use crate::database::tool_registry;
use crate::registry::ToolRegistry;
use crate::vault::Vault;
use hub_core::models::audit::{AuditActor, AuditCategory, AuditTarget};

fn is_encrypted_key(schema: &serde_json::Value, key: &str) -> bool {
    schema
        .get("properties")
        .and_then(|props| props.get(key))
        .and_then(|prop| prop.get("x-encrypted"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn validate_config(
    schema: &serde_json::Value,
    partial_config: &serde_json::Value,
) -> AppResult<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| AppError::Internal(format!("invalid config_schema in registry: {e}")))?;

    let mut field_errors = HashMap::new();
    for error in validator.iter_errors(partial_config) {
        let path = error.instance_path.to_string();
        let path = if path.is_empty() { "$".to_string() } else { path };
        field_errors.insert(path, error.to_string());
    }

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::InvalidConfig { field_errors })
    }
}

/// Orchestrates registry lookups, vault OAuth pre-checks, JSON-Schema config
/// validation, and the underlying idempotent `UserTool`/`ToolConfig` upserts.
pub struct ActivationManager {
    pool: Pool<Sqlite>,
    crypto: Arc<Crypto>,
    registry: Arc<ToolRegistry>,
    vault: Arc<Vault>,
    audit: AuditSink,
}

impl ActivationManager {
    /// Build an `ActivationManager` over its collaborators.
    #[must_use]
    pub fn new(
        pool: Pool<Sqlite>,
        crypto: Arc<Crypto>,
        registry: Arc<ToolRegistry>,
        vault: Arc<Vault>,
        audit: AuditSink,
    ) -> Self {
        Self {
            pool,
            crypto,
            registry,
            vault,
            audit,
        }
    }

    /// `list_catalogue()` — read-through to C9.
    pub async fn list_catalogue(&self) -> Vec<hub_core::models::tool::ToolRegistryEntry> {
        self.registry.list_catalogue().await
    }

    /// `activate(tool_name, partial_config)`.
    ///
    /// # Errors
    /// Returns [`AppError::UnknownTool`] if the tool is not in the registry,
    /// [`AppError::NeedsOAuth`]/[`AppError::ReauthRequired`] if the user
    /// lacks a valid grant for a required provider, or
    /// [`AppError::InvalidConfig`] if `partial_config` fails schema
    /// validation. Otherwise propagates database failures.
    pub async fn activate(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        tool_name: &str,
        partial_config: &serde_json::Value,
        oauth_redirect_uri: &str,
    ) -> AppResult<UserTool> {
        let entry = self
            .registry
            .get(tool_name)
            .await
            .ok_or_else(|| AppError::UnknownTool {
                tool_name: tool_name.to_string(),
            })?;

        if entry.auth_type == AuthType::Oauth {
            for provider in &entry.required_oauth {
                self.vault
                    .get_oauth(workspace_id, user_id, provider, &BTreeSet::new(), oauth_redirect_uri)
                    .await?;
            }
        }

        validate_config(&entry.config_schema, partial_config)?;

        let user_tool = tool_registry::activate(&self.pool, workspace_id, user_id, tool_name).await?;
        self.write_config(&entry.config_schema, user_tool.id, partial_config).await?;

        self.audit.record(AuditDraft {
            workspace_id: Some(workspace_id),
            actor: AuditActor {
                user_id: Some(user_id),
                email: None,
            },
            category: AuditCategory::Tool,
            action: "tool.activate".to_string(),
            target: AuditTarget {
                target_type: "tool".to_string(),
                id: Some(tool_name.to_string()),
                name: Some(entry.display_name.clone()),
            },
            success: true,
            error_message: None,
        });

        Ok(user_tool)
    }

    /// `deactivate(tool_name)` — soft delete; leaves config and credentials untouched.
    ///
    /// # Errors
    /// Propagates any database failure.
    pub async fn deactivate(&self, workspace_id: Uuid, user_id: Uuid, tool_name: &str) -> AppResult<()> {
        tool_registry::deactivate(&self.pool, user_id, tool_name).await?;
        self.audit.record(AuditDraft {
            workspace_id: Some(workspace_id),
            actor: AuditActor {
                user_id: Some(user_id),
                email: None,
            },
            category: AuditCategory::Tool,
            action: "tool.deactivate".to_string(),
            target: AuditTarget {
                target_type: "tool".to_string(),
                id: Some(tool_name.to_string()),
                name: None,
            },
            success: true,
            error_message: None,
        });
        Ok(())
    }

    /// `get_config(tool_name) -> map`, decrypting any `x-encrypted` key.
    ///
    /// # Errors
    /// Returns [`AppError::ToolNotActivated`] if no `UserTool` row exists,
    /// or propagates crypto/database failures.
    pub async fn get_config(
        &self,
        user_id: Uuid,
        tool_name: &str,
    ) -> AppResult<HashMap<String, serde_json::Value>> {
        let user_tool = tool_registry::get_user_tool(&self.pool, user_id, tool_name)
            .await?
            .ok_or_else(|| AppError::ToolNotActivated {
                tool_name: tool_name.to_string(),
            })?;

        let configs = tool_registry::list_configs(&self.pool, user_tool.id).await?;
        let mut result = HashMap::with_capacity(configs.len());
        for config in configs {
            let value = if config.encrypted {
                let sealed = config
                    .value
                    .as_str()
                    .ok_or_else(|| AppError::Internal(format!("encrypted config key {} is not a string", config.key)))?;
                serde_json::Value::String(self.crypto.open_from_base64(sealed)?)
            } else {
                config.value
            };
            result.insert(config.key, value);
        }
        Ok(result)
    }

    /// `update_config(tool_name, patch)` — same schema validation rules as
    /// `activate`; `x-encrypted` keys are sealed via C1 on write.
    ///
    /// # Errors
    /// Returns [`AppError::ToolNotActivated`] if no `UserTool` row exists,
    /// [`AppError::InvalidConfig`] if `patch` fails schema validation, or
    /// propagates crypto/database failures.
    pub async fn update_config(
        &self,
        user_id: Uuid,
        tool_name: &str,
        patch: &serde_json::Value,
    ) -> AppResult<()> {
        let entry = self
            .registry
            .get(tool_name)
            .await
            .ok_or_else(|| AppError::UnknownTool {
                tool_name: tool_name.to_string(),
            })?;
        let user_tool = tool_registry::get_user_tool(&self.pool, user_id, tool_name)
            .await?
            .ok_or_else(|| AppError::ToolNotActivated {
                tool_name: tool_name.to_string(),
            })?;

        validate_config(&entry.config_schema, patch)?;
        self.write_config(&entry.config_schema, user_tool.id, patch).await
    }

    async fn write_config(
        &self,
        schema: &serde_json::Value,
        user_tool_id: Uuid,
        partial_config: &serde_json::Value,
    ) -> AppResult<()> {
        let serde_json::Value::Object(map) = partial_config else {
            return Ok(());
        };
        for (key, value) in map {
            if is_encrypted_key(schema, key) {
                let plaintext = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let sealed = self.crypto.seal_to_base64(&plaintext)?;
                tool_registry::set_config(&self.pool, user_tool_id, key, &serde_json::Value::String(sealed), true)
                    .await?;
            } else {
                tool_registry::set_config(&self.pool, user_tool_id, key, value, false).await?;
            }
        }
        Ok(())
    }

    /// `list_active() -> [UserTool]`.
    ///
    /// # Errors
    /// Propagates any database failure.
    pub async fn list_active(&self, user_id: Uuid) -> AppResult<Vec<UserTool>> {
        let all = tool_registry::list_user_tools(&self.pool, user_id).await?;
        Ok(all.into_iter().filter(|t| t.enabled).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_store;
    use std::path::PathBuf;

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "workspace": {"type": "string"},
                "token": {"type": "string", "x-encrypted": true}
            },
            "required": ["workspace"]
        })
    }

    fn descriptor_dir_with_one_tool() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("hub-activation-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let body = serde_json::json!({
            "tool_name": "slack-poster",
            "display_name": "Slack Poster",
            "description": "Posts messages to Slack",
            "category": "communication",
            "config_schema": schema(),
            "required_oauth": [],
            "auth_type": "api_key",
        });
        std::fs::write(dir.join("slack-poster.json"), body.to_string()).expect("write descriptor");
        dir
    }

    async fn manager_with_registry(pool: Pool<Sqlite>, dir: &std::path::Path) -> ActivationManager {
        let registry = ToolRegistry::new(pool.clone(), dir.to_path_buf());
        registry.refresh().await.expect("refresh");
        let crypto = Arc::new(Crypto::from_raw_key([9u8; 32]));
        let vault = Arc::new(Vault::new(pool.clone(), crypto.clone(), std::collections::HashMap::new()));
        let audit = AuditSink::spawn(pool.clone());
        ActivationManager::new(pool, crypto, Arc::new(registry), vault, audit)
    }

    #[tokio::test]
    async fn activate_with_valid_config_seals_encrypted_keys() {
        let store = test_store().await;
        let dir = descriptor_dir_with_one_tool();
        let manager = manager_with_registry(store.pool().clone(), &dir).await;
        let workspace_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let config = serde_json::json!({"workspace": "acme", "token": "secret-token"});
        let activated = manager
            .activate(workspace_id, user_id, "slack-poster", &config, "https://hub.test/callback")
            .await
            .expect("activate");
        assert!(activated.enabled);

        let fetched = manager.get_config(user_id, "slack-poster").await.expect("get_config");
        assert_eq!(fetched.get("workspace"), Some(&serde_json::Value::String("acme".to_string())));
        assert_eq!(fetched.get("token"), Some(&serde_json::Value::String("secret-token".to_string())));

        let raw = tool_registry::list_configs(store.pool(), activated.id).await.expect("list raw");
        let token_row = raw.iter().find(|c| c.key == "token").expect("token row");
        assert!(token_row.encrypted);
        assert_ne!(token_row.value.as_str().expect("string"), "secret-token");
    }

    #[tokio::test]
    async fn activate_rejects_config_missing_a_required_field() {
        let store = test_store().await;
        let dir = descriptor_dir_with_one_tool();
        let manager = manager_with_registry(store.pool().clone(), &dir).await;
        let err = manager
            .activate(Uuid::new_v4(), Uuid::new_v4(), "slack-poster", &serde_json::json!({}), "https://hub.test/callback")
            .await
            .expect_err("must fail validation");
        assert!(matches!(err, AppError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn activate_unknown_tool_fails() {
        let store = test_store().await;
        let dir = descriptor_dir_with_one_tool();
        let manager = manager_with_registry(store.pool().clone(), &dir).await;
        let err = manager
            .activate(Uuid::new_v4(), Uuid::new_v4(), "does-not-exist", &serde_json::json!({}), "https://hub.test/callback")
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn deactivate_then_list_active_excludes_it() {
        let store = test_store().await;
        let dir = descriptor_dir_with_one_tool();
        let manager = manager_with_registry(store.pool().clone(), &dir).await;
        let workspace_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let config = serde_json::json!({"workspace": "acme"});
        manager
            .activate(workspace_id, user_id, "slack-poster", &config, "https://hub.test/callback")
            .await
            .expect("activate");

        manager.deactivate(workspace_id, user_id, "slack-poster").await.expect("deactivate");
        let active = manager.list_active(user_id).await.expect("list_active");
        assert!(active.is_empty());
    }
}
