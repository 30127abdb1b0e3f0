// ABOUTME: Tool Registry (C9) — scans a descriptors directory into the in-memory + persisted catalogue
// ABOUTME: Malformed descriptors are logged and skipped; a bad file never aborts startup

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hub_core::errors::AppResult;
use hub_core::models::tool::{ToolRegistryEntry, ToolTransport};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use tokio::sync::RwLock;

use crate::database::tool_registry;

/// On-disk shape of one tool descriptor file. Mirrors [`ToolRegistryEntry`]
/// minus `stale`, which is a persistence-layer concern the scanner never sets.
#[derive(Debug, Deserialize)]
struct ToolDescriptor {
    tool_name: String,
    display_name: String,
    description: String,
    category: String,
    #[serde(default)]
    config_schema: serde_json::Value,
    #[serde(default)]
    required_oauth: std::collections::BTreeSet<String>,
    auth_type: hub_core::models::tool::AuthType,
    #[serde(default)]
    transport: ToolTransport,
    #[serde(default)]
    icon: Option<String>,
}

fn is_kebab_case(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

impl ToolDescriptor {
    fn into_entry(self) -> Result<ToolRegistryEntry, String> {
        if !is_kebab_case(&self.tool_name) {
            return Err(format!("tool_name {:?} is not kebab-case", self.tool_name));
        }
        if self.config_schema.is_null() {
            return Err("config_schema is required".to_string());
        }
        Ok(ToolRegistryEntry {
            tool_name: self.tool_name,
            display_name: self.display_name,
            description: self.description,
            category: self.category,
            config_schema: self.config_schema,
            required_oauth: self.required_oauth,
            auth_type: self.auth_type,
            transport: self.transport,
            icon: self.icon,
            stale: false,
        })
    }
}

/// Reads every `*.json` descriptor directly under `dir` (non-recursive — one
/// file per tool), parsing each into a [`ToolRegistryEntry`]. A descriptor
/// that fails to parse or fails validation is logged at `warn` and skipped;
/// it never aborts the scan.
async fn scan_directory(dir: &Path) -> Vec<ToolRegistryEntry> {
    let mut entries = Vec::new();

    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(err) => {
            tracing::warn!(path = %dir.display(), error = %err, "tool descriptors directory unreadable, registry will be empty");
            return entries;
        }
    };

    loop {
        let next = match read_dir.next_entry().await {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read next descriptor directory entry");
                break;
            }
        };
        let Some(dir_entry) = next else { break };
        let path = dir_entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read tool descriptor, skipping");
                continue;
            }
        };

        let descriptor: ToolDescriptor = match serde_json::from_str(&contents) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "malformed tool descriptor, skipping");
                continue;
            }
        };

        match descriptor.into_entry() {
            Ok(entry) => entries.push(entry),
            Err(reason) => {
                tracing::warn!(path = %path.display(), reason, "invalid tool descriptor, skipping");
            }
        }
    }

    entries
}

/// Filesystem-scanned catalogue of installable tools, cached in memory and
/// mirrored into the `tool_registry` table so management routes can query
/// it without holding the cache lock across a request.
pub struct ToolRegistry {
    pool: Pool<Sqlite>,
    descriptors_dir: PathBuf,
    cache: Arc<RwLock<Vec<ToolRegistryEntry>>>,
}

impl ToolRegistry {
    /// Build a `ToolRegistry` over the request-serving pool. Call
    /// [`Self::refresh`] once at startup before serving traffic.
    #[must_use]
    pub fn new(pool: Pool<Sqlite>, descriptors_dir: PathBuf) -> Self {
        Self {
            pool,
            descriptors_dir,
            cache: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Re-scan the descriptors directory and rewrite the persisted catalogue.
    /// Returns the number of valid descriptors found. Never aborts on a
    /// malformed descriptor — it is logged and skipped instead.
    ///
    /// # Errors
    /// Propagates only database failures; descriptor parse failures are
    /// per-file and non-fatal.
    pub async fn refresh(&self) -> AppResult<usize> {
        let entries = scan_directory(&self.descriptors_dir).await;
        tool_registry::rewrite_catalog(&self.pool, &entries).await?;
        let count = entries.len();
        *self.cache.write().await = entries;
        Ok(count)
    }

    /// `list_catalogue()` — read the in-memory cache without touching the
    /// database.
    pub async fn list_catalogue(&self) -> Vec<ToolRegistryEntry> {
        self.cache.read().await.clone()
    }

    /// Fetch one catalogue entry by name from the in-memory cache.
    pub async fn get(&self, tool_name: &str) -> Option<ToolRegistryEntry> {
        self.cache.read().await.iter().find(|e| e.tool_name == tool_name).cloned()
    }
}
