// ABOUTME: Tool Proxy (C11) — resolves, authorizes, and forwards one call to a child tool server
// ABOUTME: aggregates tools/list across a user's active tools, namespaced as "{tool_name}.{child_tool_name}"

pub mod builtin;
pub mod child;
pub mod protocol;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use hub_core::errors::{AppError, AppResult};
use hub_core::models::tool::{AuthType, ToolRegistryEntry, ToolTransport};
use hub_core::permissions::{Action, PermissionChecker, Resource, ResourceScope};
use lru::LruCache;
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use uuid::Uuid;

use crate::activation::ActivationManager;
use crate::database::tool_registry;
use crate::identity::Principal;
use crate::vault::Vault;

use child::{ChildClient, ChildEnv, ChildEvent, ChildSpec, HttpClient, InProcessClient, StdioClient};
use protocol::ChildToolDef;

/// How long an idle child session is kept warm before the next call reopens it.
const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(600);
/// Sessions a single user may hold open concurrently across all tools.
const DEFAULT_PER_USER_CEILING: usize = 20;
/// How long an aggregated `tools/list` answer is reused before re-querying every child.
const TOOLS_LIST_MEMO_TTL: Duration = Duration::from_secs(30);

type SessionKey = (Uuid, String);

/// The one interface driven regardless of transport, dispatching to whichever
/// concrete child client a session actually holds. `StdioClient`'s trait-object
/// `call` is a non-functional placeholder (see `child.rs`), so stdio sessions
/// route through `StdioClient::call_owned` instead.
#[derive(Clone)]
enum ChildSession {
    InProcess(Arc<InProcessClient>),
    Stdio(Arc<StdioClient>),
    Http(Arc<HttpClient>),
}

impl ChildSession {
    async fn list_tools(&self) -> AppResult<Vec<ChildToolDef>> {
        match self {
            Self::InProcess(client) => client.list_tools().await,
            Self::Stdio(client) => client.list_tools().await,
            Self::Http(client) => client.list_tools().await,
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Self::InProcess(client) => client.is_alive(),
            Self::Stdio(client) => client.is_alive(),
            Self::Http(client) => client.is_alive(),
        }
    }

    async fn close(&self) {
        match self {
            Self::InProcess(client) => client.close().await,
            Self::Stdio(client) => client.close().await,
            Self::Http(client) => client.close().await,
        }
    }

    fn call(&self, tool_name: &str, args: Value) -> BoxStream<'static, AppResult<ChildEvent>> {
        match self {
            Self::InProcess(client) => client.call(tool_name, args),
            Self::Http(client) => client.call(tool_name, args),
            Self::Stdio(client) => {
                let client = Arc::clone(client);
                let tool_name = tool_name.to_string();
                Box::pin(async_stream::stream! {
                    yield client.call_owned(&tool_name, args).await;
                })
            }
        }
    }
}

struct CacheEntry {
    session: ChildSession,
    last_used: Instant,
}

fn child_spec_for(tool_name: &str, transport: &ToolTransport) -> ChildSpec {
    match transport {
        ToolTransport::InProcess => ChildSpec::InProcess {
            tool_name: tool_name.to_string(),
        },
        ToolTransport::Stdio { command, args } => ChildSpec::Stdio {
            command: command.clone(),
            args: args.clone(),
        },
        ToolTransport::Http { base_url } => ChildSpec::Http {
            base_url: base_url.clone(),
        },
    }
}

fn split_namespaced(namespaced: &str) -> AppResult<(String, String)> {
    namespaced
        .split_once('.')
        .map(|(tool_name, child_tool_name)| (tool_name.to_string(), child_tool_name.to_string()))
        .ok_or_else(|| AppError::UnknownTool {
            tool_name: namespaced.to_string(),
        })
}

/// Resolves, authorizes, opens, and forwards calls against a user's activated
/// tools, and aggregates their `tools/list` into one namespaced catalogue.
pub struct ToolProxy {
    pool: Pool<Sqlite>,
    activation: Arc<ActivationManager>,
    vault: Arc<Vault>,
    builtins: Arc<builtin::BuiltinRegistry>,
    sessions: RwLock<LruCache<SessionKey, CacheEntry>>,
    open_locks: DashMap<SessionKey, Arc<AsyncMutex<()>>>,
    tools_list_memo: DashMap<Uuid, (Instant, Vec<ChildToolDef>)>,
    idle_ttl: Duration,
    per_user_ceiling: usize,
    default_oauth_redirect_uri: String,
}

impl ToolProxy {
    /// Build a `ToolProxy` over its collaborators. `default_oauth_redirect_uri`
    /// is only used by the background `tools/list` aggregation path, which has
    /// no inbound request to derive a redirect URI from.
    #[must_use]
    pub fn new(
        pool: Pool<Sqlite>,
        activation: Arc<ActivationManager>,
        vault: Arc<Vault>,
        default_oauth_redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            activation,
            vault,
            builtins: Arc::new(builtin::BuiltinRegistry::new()),
            sessions: RwLock::new(LruCache::unbounded()),
            open_locks: DashMap::new(),
            tools_list_memo: DashMap::new(),
            idle_ttl: DEFAULT_IDLE_TTL,
            per_user_ceiling: DEFAULT_PER_USER_CEILING,
            default_oauth_redirect_uri: default_oauth_redirect_uri.into(),
        }
    }

    /// Forward one call to `namespaced_tool` (e.g. `"wait.sleep"`), returning
    /// the child's event stream unbuffered so the caller can relay progress
    /// events as they arrive. Dropping the returned stream before it completes
    /// cancels the in-flight call.
    ///
    /// # Errors
    /// Returns [`AppError::ToolNotActivated`] if the owning tool isn't
    /// enabled for this user, [`AppError::Forbidden`] if the permission
    /// checker denies the call, [`AppError::NeedsOAuth`]/[`AppError::ReauthRequired`]
    /// if a required credential is missing or stale, or
    /// [`AppError::ToolError`] if the child itself fails.
    pub async fn call(
        &self,
        principal: &Principal,
        namespaced_tool: &str,
        args: Value,
        oauth_redirect_uri: &str,
    ) -> AppResult<BoxStream<'static, AppResult<ChildEvent>>> {
        let (tool_name, child_tool_name) = split_namespaced(namespaced_tool)?;

        let user_tool = tool_registry::get_user_tool(&self.pool, principal.user_id, &tool_name)
            .await?
            .filter(|user_tool| user_tool.enabled)
            .ok_or_else(|| AppError::ToolNotActivated {
                tool_name: tool_name.clone(),
            })?;

        let verdict = PermissionChecker::check(
            &hub_core::permissions::Principal::from(principal),
            &Resource {
                workspace_id: principal.workspace_id,
                scope: ResourceScope::OwnedByUser(user_tool.user_id),
            },
            Action::Invoke,
        );
        if !verdict.allowed {
            return Err(AppError::Forbidden { reason: verdict.reason });
        }

        let entry = self
            .activation
            .list_catalogue()
            .await
            .into_iter()
            .find(|entry| entry.tool_name == tool_name)
            .ok_or_else(|| AppError::UnknownTool {
                tool_name: tool_name.clone(),
            })?;

        let mut env = self
            .materialize_credentials(principal.workspace_id, principal.user_id, &entry, oauth_redirect_uri)
            .await?;
        for (key, value) in self.activation.get_config(principal.user_id, &tool_name).await? {
            env.entry(key).or_insert(value);
        }

        let spec = child_spec_for(&entry.tool_name, &entry.transport);
        let session = self
            .get_or_open_session(principal.user_id, &tool_name, spec, env)
            .await?;

        Ok(session.call(&child_tool_name, args))
    }

    /// Aggregate `tools/list` across every tool the user has activated,
    /// namespaced as `"{tool_name}.{child_tool_name}"`. A child that fails to
    /// list its tools is logged and skipped rather than failing the whole
    /// aggregation, mirroring the registry's tolerant descriptor scan.
    ///
    /// # Errors
    /// Propagates only database failures in loading the active tool set;
    /// individual child failures are swallowed and logged.
    pub async fn list_tools(&self, principal: &Principal) -> AppResult<Vec<ChildToolDef>> {
        if let Some(cached) = self.tools_list_memo.get(&principal.user_id) {
            let (cached_at, tools) = &*cached;
            if cached_at.elapsed() < TOOLS_LIST_MEMO_TTL {
                return Ok(tools.clone());
            }
        }

        let active = self.activation.list_active(principal.user_id).await?;
        let catalogue = self.activation.list_catalogue().await;
        let mut aggregated = Vec::new();

        for user_tool in active {
            let Some(entry) = catalogue.iter().find(|entry| entry.tool_name == user_tool.tool_name) else {
                continue;
            };

            let env = match self
                .materialize_credentials(
                    principal.workspace_id,
                    principal.user_id,
                    entry,
                    &self.default_oauth_redirect_uri,
                )
                .await
            {
                Ok(env) => env,
                Err(err) => {
                    tracing::warn!(tool = %entry.tool_name, error = %err, "skipping tool in aggregate listing: credentials unavailable");
                    continue;
                }
            };

            let spec = child_spec_for(&entry.tool_name, &entry.transport);
            let session = match self
                .get_or_open_session(principal.user_id, &entry.tool_name, spec, env)
                .await
            {
                Ok(session) => session,
                Err(err) => {
                    tracing::warn!(tool = %entry.tool_name, error = %err, "skipping tool in aggregate listing: session failed to open");
                    continue;
                }
            };

            match session.list_tools().await {
                Ok(defs) => aggregated.extend(defs.into_iter().map(|def| ChildToolDef {
                    name: format!("{}.{}", entry.tool_name, def.name),
                    description: def.description,
                    input_schema: def.input_schema,
                })),
                Err(err) => {
                    tracing::warn!(tool = %entry.tool_name, error = %err, "skipping tool in aggregate listing: list_tools failed");
                }
            }
        }

        self.tools_list_memo
            .insert(principal.user_id, (Instant::now(), aggregated.clone()));
        Ok(aggregated)
    }

    /// Close and evict every idle session whose TTL has elapsed. Intended to
    /// be called periodically by a background task; also happens lazily on
    /// access, so this is only needed to reclaim sessions nobody calls again.
    pub async fn sweep_idle(&self) {
        let expired: Vec<SessionKey> = {
            let cache = self.sessions.read().await;
            cache
                .iter()
                .filter(|(_, entry)| entry.last_used.elapsed() > self.idle_ttl)
                .map(|(key, _)| key.clone())
                .collect()
        };
        if expired.is_empty() {
            return;
        }
        let mut cache = self.sessions.write().await;
        for key in expired {
            if let Some(entry) = cache.pop(&key) {
                entry.session.close().await;
            }
        }
    }

    async fn materialize_credentials(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        entry: &ToolRegistryEntry,
        oauth_redirect_uri: &str,
    ) -> AppResult<ChildEnv> {
        let mut env = ChildEnv::new();
        match entry.auth_type {
            AuthType::None => {}
            AuthType::ApiKey => {
                if let Some(key) = self.vault.get_api_key(workspace_id, user_id, &entry.tool_name).await? {
                    env.insert("api_key".to_string(), Value::String(key));
                }
            }
            AuthType::Oauth => {
                for provider in &entry.required_oauth {
                    let token = self
                        .vault
                        .get_oauth(workspace_id, user_id, provider, &BTreeSet::new(), oauth_redirect_uri)
                        .await?;
                    env.insert(format!("{provider}_access_token"), Value::String(token));
                }
            }
        }
        Ok(env)
    }

    async fn get_or_open_session(
        &self,
        user_id: Uuid,
        tool_name: &str,
        spec: ChildSpec,
        env: ChildEnv,
    ) -> AppResult<ChildSession> {
        let key: SessionKey = (user_id, tool_name.to_string());

        if let Some(session) = self.reuse_if_fresh(&key).await {
            return Ok(session);
        }

        let lock = self
            .open_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(session) = self.reuse_if_fresh(&key).await {
            self.open_locks.remove(&key);
            return Ok(session);
        }

        self.evict_oldest_for_user_if_at_ceiling(user_id).await;

        let session = open_session(spec, env, &self.builtins).await;
        self.open_locks.remove(&key);
        let session = session?;

        self.sessions.write().await.put(
            key,
            CacheEntry {
                session: session.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(session)
    }

    async fn reuse_if_fresh(&self, key: &SessionKey) -> Option<ChildSession> {
        let mut cache = self.sessions.write().await;
        let entry = cache.get_mut(key)?;
        if entry.last_used.elapsed() > self.idle_ttl || !entry.session.is_alive() {
            cache.pop(key);
            return None;
        }
        entry.last_used = Instant::now();
        Some(entry.session.clone())
    }

    async fn evict_oldest_for_user_if_at_ceiling(&self, user_id: Uuid) {
        let victim = {
            let cache = self.sessions.read().await;
            let user_keys: Vec<SessionKey> = cache
                .iter()
                .filter(|(key, _)| key.0 == user_id)
                .map(|(key, _)| key.clone())
                .collect();
            if user_keys.len() < self.per_user_ceiling {
                None
            } else {
                user_keys.into_iter().last()
            }
        };
        let Some(victim) = victim else { return };
        let evicted = self.sessions.write().await.pop(&victim);
        if let Some(entry) = evicted {
            entry.session.close().await;
        }
    }
}

async fn open_session(spec: ChildSpec, env: ChildEnv, builtins: &builtin::BuiltinRegistry) -> AppResult<ChildSession> {
    match spec {
        ChildSpec::InProcess { tool_name } => {
            let handler = builtins.get(&tool_name).ok_or(AppError::UnknownTool { tool_name })?;
            Ok(ChildSession::InProcess(Arc::new(InProcessClient::new(handler, env))))
        }
        ChildSpec::Stdio { command, args } => {
            let client = StdioClient::spawn(&command, &args, &env).await?;
            Ok(ChildSession::Stdio(Arc::new(client)))
        }
        ChildSpec::Http { base_url } => {
            let client = HttpClient::connect(&base_url).await?;
            Ok(ChildSession::Http(Arc::new(client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditSink;
    use crate::crypto::Crypto;
    use crate::database::test_store;
    use crate::registry::ToolRegistry;

    async fn proxy_with_wait_tool() -> (ToolProxy, Uuid, Uuid) {
        let store = test_store().await;
        let workspace_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let dir = std::env::temp_dir().join(format!("hub-proxy-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        std::fs::write(
            dir.join("wait.json"),
            r#"{
                "tool_name": "wait",
                "display_name": "Wait",
                "description": "Builtin delay tool",
                "category": "utility",
                "config_schema": {"type": "object"},
                "auth_type": "none",
                "transport": {"kind": "in_process"}
            }"#,
        )
        .expect("write descriptor");

        let registry = Arc::new(ToolRegistry::new(store.pool().clone(), dir));
        registry.refresh().await.expect("refresh registry");

        let crypto = Arc::new(Crypto::from_raw_key([7u8; 32]));
        let vault = Arc::new(Vault::new(store.pool().clone(), crypto.clone(), std::collections::HashMap::new()));
        let audit = AuditSink::spawn(store.pool().clone());
        let activation = Arc::new(ActivationManager::new(store.pool().clone(), crypto, registry, vault.clone(), audit));

        activation
            .activate(workspace_id, user_id, "wait", &serde_json::json!({}), "https://hub.test/callback")
            .await
            .expect("activate wait tool");

        let proxy = ToolProxy::new(store.pool().clone(), activation, vault, "https://hub.test/callback");
        (proxy, workspace_id, user_id)
    }

    #[tokio::test]
    async fn calling_an_unactivated_tool_is_rejected() {
        let (proxy, _workspace_id, user_id) = proxy_with_wait_tool().await;
        let principal = Principal {
            user_id,
            workspace_id: Uuid::new_v4(),
            is_super_admin: false,
            email: "user@example.test".to_string(),
        };
        let err = proxy
            .call(&principal, "nonexistent.sleep", serde_json::json!({}), "https://hub.test/callback")
            .await
            .expect_err("tool was never activated");
        assert!(matches!(err, AppError::ToolNotActivated { .. }));
    }

    #[tokio::test]
    async fn calling_an_activated_builtin_tool_streams_a_final_event() {
        let (proxy, workspace_id, user_id) = proxy_with_wait_tool().await;
        let principal = Principal {
            user_id,
            workspace_id,
            is_super_admin: false,
            email: "user@example.test".to_string(),
        };
        let mut stream = proxy
            .call(&principal, "wait.sleep", serde_json::json!({"seconds": 0.01}), "https://hub.test/callback")
            .await
            .expect("call succeeds");

        let event = stream.next().await.expect("one event").expect("event ok");
        assert!(matches!(event, ChildEvent::Final(_)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn aggregated_tools_list_namespaces_child_tool_names() {
        let (proxy, workspace_id, user_id) = proxy_with_wait_tool().await;
        let principal = Principal {
            user_id,
            workspace_id,
            is_super_admin: false,
            email: "user@example.test".to_string(),
        };
        let tools = proxy.list_tools(&principal).await.expect("list tools");
        assert!(tools.iter().any(|def| def.name == "wait.sleep"));
    }
}
