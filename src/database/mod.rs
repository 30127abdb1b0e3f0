// ABOUTME: Relational data store (C2) with dual pools and idempotent, forward-only migrations
// ABOUTME: One SQLite file by default; a bounded discovery pool keeps scans from starving requests

pub mod audit;
pub mod credential;
pub mod discovery;
pub mod session;
pub mod system_config;
pub mod tenancy;
pub mod tool_registry;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};

/// Default number of connections given to the request-serving pool.
const REQUEST_POOL_SIZE: u32 = 10;

/// Default number of connections given to the discovery-scan pool. Kept
/// small and separate so a large filesystem scan (C12) cannot exhaust
/// connections that request handlers need.
const DISCOVERY_POOL_SIZE: u32 = 2;

/// The Hub's relational store.
///
/// Two pools share one underlying SQLite file: `request_pool` backs every
/// HTTP handler and MCP call, `discovery_pool` backs the agent-discovery
/// scanner. Splitting them means a slow scan never blocks an incoming
/// tool call waiting on a connection.
#[derive(Clone)]
pub struct Store {
    request_pool: Pool<Sqlite>,
    discovery_pool: Pool<Sqlite>,
}

impl Store {
    /// Open (creating if absent) the SQLite database at `database_url` and
    /// run every migration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created/opened, or if any
    /// migration statement fails.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        let request_pool = SqlitePoolOptions::new()
            .max_connections(REQUEST_POOL_SIZE)
            .connect(&connection_options)
            .await?;
        let discovery_pool = SqlitePoolOptions::new()
            .max_connections(DISCOVERY_POOL_SIZE)
            .connect(&connection_options)
            .await?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&request_pool)
            .await?;
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&request_pool)
            .await?;

        let store = Self {
            request_pool,
            discovery_pool,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Build a [`Store`] directly from an already-connected pool, sharing
    /// it for both request and discovery traffic. Used by tests against an
    /// in-memory database, where connection-count starvation is moot.
    #[must_use]
    pub fn from_shared_pool(pool: Pool<Sqlite>) -> Self {
        Self {
            request_pool: pool.clone(),
            discovery_pool: pool,
        }
    }

    /// The pool request handlers and MCP calls should use.
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.request_pool
    }

    /// The pool the discovery scanner (C12) should use.
    #[must_use]
    pub const fn discovery_pool(&self) -> &Pool<Sqlite> {
        &self.discovery_pool
    }

    /// Run every table-creation migration. Every statement is
    /// `CREATE TABLE IF NOT EXISTS`/`CREATE INDEX IF NOT EXISTS` — safe to
    /// re-run on every start, forward-only, no down-migrations.
    async fn migrate(&self) -> anyhow::Result<()> {
        system_config::migrate(&self.request_pool).await?;
        tenancy::migrate(&self.request_pool).await?;
        tool_registry::migrate(&self.request_pool).await?;
        credential::migrate(&self.request_pool).await?;
        discovery::migrate(&self.request_pool).await?;
        audit::migrate(&self.request_pool).await?;
        session::migrate(&self.request_pool).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> Store {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let store = Store::from_shared_pool(pool);
    store.migrate().await.expect("migrate");
    store
}
