// ABOUTME: SystemConfig persistence — the singleton bootstrap row (C2 + C3 + C4)
// ABOUTME: `set_config`/`get_config` back the Config Store; `app_mode` powers the Mode Manager

use hub_core::errors::{AppError, AppResult};
use hub_core::models::system_config::{AppMode, SystemConfig};
use sqlx::{Pool, Row, Sqlite};

pub(super) async fn migrate(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS system_config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            app_mode TEXT NOT NULL DEFAULT 'UNCONFIGURED',
            encryption_salt BLOB NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS config_kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            encrypted INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_system_config(row: &sqlx::sqlite::SqliteRow) -> AppResult<SystemConfig> {
    let app_mode_str: String = row.try_get("app_mode")?;
    let app_mode = AppMode::parse(&app_mode_str)
        .map_err(|bad| AppError::Internal(format!("corrupt app_mode column: {bad}")))?;
    Ok(SystemConfig {
        app_mode,
        encryption_salt: row.try_get("encryption_salt")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Read the singleton row, creating it (in `UNCONFIGURED` mode, with a
/// fresh random salt) on first call.
///
/// # Errors
/// Propagates any database failure as [`AppError::Internal`].
pub async fn load_or_init(pool: &Pool<Sqlite>) -> AppResult<SystemConfig> {
    if let Some(row) = sqlx::query("SELECT * FROM system_config WHERE id = 1")
        .fetch_optional(pool)
        .await?
    {
        return row_to_system_config(&row);
    }

    let salt = crate::crypto::Crypto::generate_salt();
    let config = SystemConfig::new(salt);
    sqlx::query(
        r"
        INSERT INTO system_config (id, app_mode, encryption_salt, created_at, updated_at)
        VALUES (1, ?1, ?2, ?3, ?4)
        ",
    )
    .bind(config.app_mode.as_str())
    .bind(&config.encryption_salt)
    .bind(config.created_at)
    .bind(config.updated_at)
    .execute(pool)
    .await?;

    Ok(config)
}

/// Transition `app_mode`, failing closed if the move isn't in the allowed
/// monotone set (see [`AppMode::can_transition_to`]).
///
/// # Errors
/// Returns [`AppError::AlreadyConfigured`] if the transition is not
/// permitted from the current state.
pub async fn transition_mode(pool: &Pool<Sqlite>, next: AppMode) -> AppResult<SystemConfig> {
    let current = load_or_init(pool).await?;
    if !current.app_mode.can_transition_to(next) {
        return Err(AppError::AlreadyConfigured);
    }

    sqlx::query("UPDATE system_config SET app_mode = ?1, updated_at = ?2 WHERE id = 1")
        .bind(next.as_str())
        .bind(chrono::Utc::now())
        .execute(pool)
        .await?;

    load_or_init(pool).await
}

/// `Config Store::get` (C3). Returns the raw stored value (still encrypted
/// if it was written with `encrypted = true`); callers needing the
/// plaintext must pass it through [`crate::crypto::Crypto::open_from_base64`].
///
/// # Errors
/// Propagates any database failure.
pub async fn get(pool: &Pool<Sqlite>, key: &str) -> AppResult<Option<(String, bool)>> {
    let row = sqlx::query("SELECT value, encrypted FROM config_kv WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| (r.get("value"), r.get::<i64, _>("encrypted") != 0)))
}

/// `Config Store::set` (C3). `value` must already be in its final stored
/// form — callers pass ciphertext when `encrypted = true`.
///
/// # Errors
/// Propagates any database failure.
pub async fn set(pool: &Pool<Sqlite>, key: &str, value: &str, encrypted: bool) -> AppResult<()> {
    sqlx::query(
        r"
        INSERT INTO config_kv (key, value, encrypted, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, encrypted = excluded.encrypted, updated_at = excluded.updated_at
        ",
    )
    .bind(key)
    .bind(value)
    .bind(encrypted)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_store;

    #[tokio::test]
    async fn load_or_init_creates_unconfigured_singleton() {
        let store = test_store().await;
        let config = load_or_init(store.pool()).await.expect("load");
        assert_eq!(config.app_mode, AppMode::Unconfigured);
        assert_eq!(config.encryption_salt.len(), 32);

        let again = load_or_init(store.pool()).await.expect("load again");
        assert_eq!(again.created_at, config.created_at);
    }

    #[tokio::test]
    async fn transition_mode_rejects_backward_moves() {
        let store = test_store().await;
        load_or_init(store.pool()).await.expect("load");
        transition_mode(store.pool(), AppMode::Local)
            .await
            .expect("forward transition");

        let err = transition_mode(store.pool(), AppMode::Unconfigured)
            .await
            .expect_err("backward transition must fail");
        assert!(matches!(err, AppError::AlreadyConfigured));
    }

    #[tokio::test]
    async fn config_kv_roundtrips_and_upserts() {
        let store = test_store().await;
        set(store.pool(), "bind_port", "8080", false)
            .await
            .expect("set");
        let (value, encrypted) = get(store.pool(), "bind_port")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(value, "8080");
        assert!(!encrypted);

        set(store.pool(), "bind_port", "9090", false)
            .await
            .expect("overwrite");
        let (value, _) = get(store.pool(), "bind_port")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(value, "9090");
    }
}
