// ABOUTME: Bootstrap configuration (C3's env layer) — read once at startup, before the database exists
// ABOUTME: Everything past first boot lives in SystemConfig instead; grounded in the teacher's config/environment.rs ServerConfig::from_env shape, narrowed to bootstrap-only concerns

use std::path::PathBuf;

use clap::Parser;

/// Bootstrap overrides accepted as CLI flags or `HUB_*` environment
/// variables. Precedence: CLI flag > environment variable > built-in
/// default. Nothing here is read again after [`HubConfig::load`] runs —
/// steady-state configuration (app mode, WorkOS params, bind address for a
/// running deployment) lives in `SystemConfig` (C3) instead.
#[derive(Debug, Clone, Parser)]
#[command(name = "hub-mcp-server", about = "Multi-tenant Hub exposing MCP tools as one aggregate endpoint")]
pub struct HubConfig {
    /// Address the HTTP front door binds to.
    #[arg(long, env = "HUB_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port the HTTP front door binds to.
    #[arg(long, env = "HUB_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Path to the SQLite database file. `sqlite::memory:` is accepted for
    /// throwaway/test runs.
    #[arg(long, env = "HUB_DATABASE_PATH", default_value = "hub.sqlite3")]
    pub database_path: String,

    /// Directory scanned by the Tool Registry (C9) for `*.json` tool descriptors.
    #[arg(long, env = "HUB_TOOL_DESCRIPTORS_DIR", default_value = "assets/tools")]
    pub tool_descriptors_dir: PathBuf,

    /// Directory of static UI assets served at `/`.
    #[arg(long, env = "HUB_STATIC_ASSETS_DIR", default_value = "assets/ui")]
    pub static_assets_dir: PathBuf,

    /// The externally reachable base URL this Hub is served at, used to
    /// build OAuth `redirect_uri`s for both WorkOS login and per-tool
    /// provider grants. Defaults to `http://{host}:{port}`, which is only
    /// correct for local/loopback deployments.
    #[arg(long, env = "HUB_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,
}

impl HubConfig {
    /// Parse CLI flags, honoring `HUB_*` environment variables as
    /// `clap`'s `env` fallback for each field.
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }

    /// The `sqlx` connection string for [`Self::database_path`].
    #[must_use]
    pub fn database_url(&self) -> String {
        if self.database_path.starts_with("sqlite:") || self.database_path == "sqlite::memory:" {
            self.database_path.clone()
        } else {
            format!("sqlite:{}", self.database_path)
        }
    }

    /// The socket address the HTTP server should bind.
    ///
    /// # Errors
    /// Returns an error if `host` is not a valid IP address.
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        let ip: std::net::IpAddr = self.host.parse()?;
        Ok(std::net::SocketAddr::from((ip, self.port)))
    }

    /// The base URL OAuth redirect URIs are built against.
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_is_prefixed_with_sqlite_scheme() {
        let config = HubConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_path: "hub.sqlite3".to_string(),
            tool_descriptors_dir: PathBuf::from("assets/tools"),
            static_assets_dir: PathBuf::from("assets/ui"),
            public_base_url: None,
        };
        assert_eq!(config.database_url(), "sqlite:hub.sqlite3");
    }

    #[test]
    fn in_memory_url_passes_through_unchanged() {
        let config = HubConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_path: "sqlite::memory:".to_string(),
            tool_descriptors_dir: PathBuf::from("assets/tools"),
            static_assets_dir: PathBuf::from("assets/ui"),
            public_base_url: None,
        };
        assert_eq!(config.database_url(), "sqlite::memory:");
    }
}
