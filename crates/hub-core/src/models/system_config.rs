// ABOUTME: The SystemConfig singleton: bootstrap mode, encryption salt, and config KV
// ABOUTME: Exactly one row exists; app_mode only ever moves forward

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The bootstrap state machine's three states.
///
/// Transitions only ever go `Unconfigured -> Local`, `Unconfigured -> Workos`,
/// or `Local -> Workos` — never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppMode {
    /// No identity adapter is active yet; only setup endpoints are reachable.
    Unconfigured,
    /// Single passwordless admin, no external identity provider.
    Local,
    /// Delegated OAuth/OIDC via an external identity provider (WorkOS AuthKit).
    Workos,
}

impl AppMode {
    /// Whether `self -> next` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unconfigured, Self::Local)
                | (Self::Unconfigured, Self::Workos)
                | (Self::Local, Self::Workos)
        )
    }

    /// Stored/serialized representation, matching the `system_config.app_mode` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "UNCONFIGURED",
            Self::Local => "LOCAL",
            Self::Workos => "WORKOS",
        }
    }

    /// Parse from the stored column value.
    ///
    /// # Errors
    /// Returns the original string if it does not match a known mode.
    pub fn parse(s: &str) -> Result<Self, &str> {
        match s {
            "UNCONFIGURED" => Ok(Self::Unconfigured),
            "LOCAL" => Ok(Self::Local),
            "WORKOS" => Ok(Self::Workos),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for AppMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The singleton system configuration row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Current bootstrap state.
    pub app_mode: AppMode,
    /// Random salt mixed into the machine-bound key derivation (C1).
    /// Opaque base64 in the API surface; raw bytes internally.
    pub encryption_salt: Vec<u8>,
    /// When this row was first created.
    pub created_at: DateTime<Utc>,
    /// When this row was last mutated (by setup or upgrade endpoints).
    pub updated_at: DateTime<Utc>,
}

impl SystemConfig {
    /// A freshly bootstrapped, unconfigured system.
    #[must_use]
    pub fn new(encryption_salt: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            app_mode: AppMode::Unconfigured,
            encryption_salt,
            created_at: now,
            updated_at: now,
        }
    }
}
