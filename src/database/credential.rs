// ABOUTME: Credential persistence (C8 Credential Vault) — rows always hold sealed secrets
// ABOUTME: `(user_id, provider, kind)` is unique; callers are responsible for sealing/opening via Crypto

use std::collections::BTreeSet;

use hub_core::errors::AppResult;
use hub_core::models::credential::{Credential, CredentialKind};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

pub(super) async fn migrate(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS credentials (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            provider TEXT NOT NULL,
            kind TEXT NOT NULL,
            secret TEXT,
            access_token TEXT,
            refresh_token TEXT,
            expires_at TEXT,
            scopes TEXT NOT NULL DEFAULT '[]',
            issued_at TEXT NOT NULL,
            UNIQUE(user_id, provider, kind)
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_credential(row: &sqlx::sqlite::SqliteRow) -> AppResult<Credential> {
    let kind_str: String = row.try_get("kind")?;
    let kind = CredentialKind::parse(&kind_str)
        .map_err(|bad| hub_core::errors::AppError::Internal(format!("corrupt kind column: {bad}")))?;
    let scopes_json: String = row.try_get("scopes")?;
    let scopes: BTreeSet<String> = serde_json::from_str(&scopes_json).unwrap_or_default();

    Ok(Credential {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        user_id: row.try_get("user_id")?,
        provider: row.try_get("provider")?,
        kind,
        secret: row.try_get("secret")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        expires_at: row.try_get("expires_at")?,
        scopes,
        issued_at: row.try_get("issued_at")?,
    })
}

/// Upsert a Credential row. The caller is responsible for sealing every
/// secret-bearing field through Crypto (C1) before calling this —
/// `upsert` stores exactly what it is given.
///
/// # Errors
/// Propagates any database failure.
pub async fn upsert(pool: &Pool<Sqlite>, credential: &Credential) -> AppResult<()> {
    let scopes_json = serde_json::to_string(&credential.scopes)?;
    sqlx::query(
        r"
        INSERT INTO credentials (id, workspace_id, user_id, provider, kind, secret, access_token, refresh_token, expires_at, scopes, issued_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(user_id, provider, kind) DO UPDATE SET
            secret = excluded.secret,
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            expires_at = excluded.expires_at,
            scopes = excluded.scopes,
            issued_at = excluded.issued_at
        ",
    )
    .bind(credential.id)
    .bind(credential.workspace_id)
    .bind(credential.user_id)
    .bind(&credential.provider)
    .bind(credential.kind.as_str())
    .bind(&credential.secret)
    .bind(&credential.access_token)
    .bind(&credential.refresh_token)
    .bind(credential.expires_at)
    .bind(scopes_json)
    .bind(credential.issued_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a user's credential for a provider, still sealed.
///
/// # Errors
/// Propagates any database failure.
pub async fn get(
    pool: &Pool<Sqlite>,
    user_id: Uuid,
    provider: &str,
    kind: CredentialKind,
) -> AppResult<Option<Credential>> {
    let row = sqlx::query("SELECT * FROM credentials WHERE user_id = ?1 AND provider = ?2 AND kind = ?3")
        .bind(user_id)
        .bind(provider)
        .bind(kind.as_str())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_credential).transpose()
}

/// Delete a user's credential for a provider (e.g. on revoke).
///
/// # Errors
/// Propagates any database failure.
pub async fn delete(pool: &Pool<Sqlite>, user_id: Uuid, provider: &str, kind: CredentialKind) -> AppResult<()> {
    sqlx::query("DELETE FROM credentials WHERE user_id = ?1 AND provider = ?2 AND kind = ?3")
        .bind(user_id)
        .bind(provider)
        .bind(kind.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_store;
    use chrono::Utc;

    fn sample(user_id: Uuid) -> Credential {
        Credential {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            user_id,
            provider: "google".to_string(),
            kind: CredentialKind::Oauth2,
            secret: None,
            access_token: Some("sealed-access".to_string()),
            refresh_token: Some("sealed-refresh".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            scopes: BTreeSet::from(["gmail.readonly".to_string()]),
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let store = test_store().await;
        let user_id = Uuid::new_v4();
        let credential = sample(user_id);
        upsert(store.pool(), &credential).await.expect("upsert");

        let fetched = get(store.pool(), user_id, "google", CredentialKind::Oauth2)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fetched.access_token, credential.access_token);
        assert_eq!(fetched.scopes, credential.scopes);
    }

    #[tokio::test]
    async fn second_upsert_replaces_tokens() {
        let store = test_store().await;
        let user_id = Uuid::new_v4();
        let mut credential = sample(user_id);
        upsert(store.pool(), &credential).await.expect("first upsert");

        credential.access_token = Some("new-sealed-access".to_string());
        upsert(store.pool(), &credential).await.expect("second upsert");

        let fetched = get(store.pool(), user_id, "google", CredentialKind::Oauth2)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fetched.access_token.as_deref(), Some("new-sealed-access"));
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = test_store().await;
        let user_id = Uuid::new_v4();
        upsert(store.pool(), &sample(user_id)).await.expect("upsert");
        delete(store.pool(), user_id, "google", CredentialKind::Oauth2)
            .await
            .expect("delete");
        assert!(get(store.pool(), user_id, "google", CredentialKind::Oauth2)
            .await
            .expect("get")
            .is_none());
    }
}
