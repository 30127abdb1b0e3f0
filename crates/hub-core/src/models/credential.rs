// ABOUTME: Credential — per-user secret bound to a provider, always stored sealed
// ABOUTME: Covers both opaque API keys and OAuth2 token sets with scope tracking

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which shape of secret this row holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// A single opaque secret string.
    ApiKey,
    /// A full OAuth2 token set (access + optional refresh).
    Oauth2,
}

impl CredentialKind {
    /// Stored/serialized representation, matching the `credentials.kind` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Oauth2 => "oauth2",
        }
    }

    /// Parse from the stored column value.
    ///
    /// # Errors
    /// Returns the original string if it does not match a known kind.
    pub fn parse(s: &str) -> Result<Self, &str> {
        match s {
            "api_key" => Ok(Self::ApiKey),
            "oauth2" => Ok(Self::Oauth2),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-user secret bound to a named provider.
///
/// `(user_id, provider)` is unique per `kind`. Every secret-bearing field is
/// stored sealed (C1); this struct holds the *decrypted* view used once a
/// row has already been opened by the vault — never serialize it back to
/// the wire without redacting `access_token`/`refresh_token`/`secret`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Primary key.
    pub id: Uuid,
    /// Owning workspace.
    pub workspace_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Provider name, e.g. `"google"`.
    pub provider: String,
    /// Which shape this row holds.
    pub kind: CredentialKind,
    /// Opaque secret, set only when `kind == ApiKey`.
    pub secret: Option<String>,
    /// Access token, set only when `kind == Oauth2`.
    pub access_token: Option<String>,
    /// Refresh token, optional even for `Oauth2`.
    pub refresh_token: Option<String>,
    /// Access token expiry, set only when `kind == Oauth2`.
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes the access token actually covers.
    pub scopes: BTreeSet<String>,
    /// When this grant was issued (refresh replaces this, it does not reset it to `now`
    /// unless the provider reissues from scratch).
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    /// An access token is only usable if it has more than 60s of life left
    /// and covers every scope the caller needs.
    #[must_use]
    pub fn covers(&self, required_scopes: &BTreeSet<String>) -> bool {
        let not_expiring_imminently = match self.expires_at {
            Some(exp) => exp - Utc::now() > chrono::Duration::seconds(60),
            None => true,
        };
        not_expiring_imminently && required_scopes.is_subset(&self.scopes)
    }

    /// Whether a refresh could plausibly restore validity (a refresh token
    /// exists and the grant already covers the requested scopes).
    #[must_use]
    pub fn can_refresh_for(&self, required_scopes: &BTreeSet<String>) -> bool {
        self.refresh_token.is_some() && required_scopes.is_subset(&self.scopes)
    }
}
