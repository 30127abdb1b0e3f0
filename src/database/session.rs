// ABOUTME: Server-side session persistence backing Identity (C5)
// ABOUTME: Only a sha256 hash of the cookie value is ever stored; logout deletes the row for real

use chrono::{DateTime, Utc};
use hub_core::errors::AppResult;
use sha2::{Digest, Sha256};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

/// One server-side session row, keyed by the sha256 of the cookie value the
/// client actually holds. Deleting the row is a real logout — unlike a bare
/// JWT, there is nothing left for the client to replay.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    /// sha256 hex digest of the cookie value.
    pub token_hash: String,
    /// The session's owning user.
    pub user_id: Uuid,
    /// Denormalized for cheap workspace resolution without a join.
    pub workspace_id: Uuid,
    /// When the session was issued.
    pub created_at: DateTime<Utc>,
    /// When the session stops being valid.
    pub expires_at: DateTime<Utc>,
}

pub(super) async fn migrate(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            workspace_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Hash a raw cookie value the way every lookup/insert in this module does,
/// so the raw value itself never touches the database.
#[must_use]
pub fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create a session row. `raw_token` is hashed before storage.
///
/// # Errors
/// Propagates any database failure.
pub async fn create(
    pool: &Pool<Sqlite>,
    raw_token: &str,
    user_id: Uuid,
    workspace_id: Uuid,
    ttl: chrono::Duration,
) -> AppResult<()> {
    let now = Utc::now();
    sqlx::query(
        r"
        INSERT INTO sessions (token_hash, user_id, workspace_id, created_at, expires_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
    )
    .bind(hash_token(raw_token))
    .bind(user_id)
    .bind(workspace_id)
    .bind(now)
    .bind(now + ttl)
    .execute(pool)
    .await?;
    Ok(())
}

/// Look up a session by its raw cookie value. Returns `None` for a missing
/// or expired session — callers must not distinguish the two cases to the
/// client (both are `Unauthenticated`).
///
/// # Errors
/// Propagates any database failure.
pub async fn find_valid(pool: &Pool<Sqlite>, raw_token: &str) -> AppResult<Option<Session>> {
    let session = sqlx::query_as::<_, Session>(
        "SELECT * FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
    )
    .bind(hash_token(raw_token))
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;
    Ok(session)
}

/// Delete a session by its raw cookie value — a real logout.
///
/// # Errors
/// Propagates any database failure.
pub async fn delete(pool: &Pool<Sqlite>, raw_token: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?1")
        .bind(hash_token(raw_token))
        .execute(pool)
        .await?;
    Ok(())
}

/// Purge every expired session. Called periodically rather than on every
/// request, since an expired-but-unpurged row is already rejected by
/// [`find_valid`]'s `expires_at > now` clause.
///
/// # Errors
/// Propagates any database failure.
pub async fn purge_expired(pool: &Pool<Sqlite>) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
