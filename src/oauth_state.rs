// ABOUTME: Bounded-TTL ephemeral state store shared by the WorkOS login flow (C5) and the vault's tool OAuth flow (C8)
// ABOUTME: Backed by dashmap, matching the teacher's concurrent-map usage elsewhere in the codebase

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Default TTL for an authorize-flow `state` value:
/// "a bounded state TTL (default 10 minutes)".
pub const STATE_TTL: Duration = Duration::minutes(10);

struct Entry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

/// A `state` -> `T` map with a TTL per entry. `T` typically carries whatever
/// context the callback needs to finish the flow (a PKCE verifier, the
/// `(user_id, provider, scopes)` tuple a tool OAuth flow is bound to, ...).
pub struct OAuthStateStore<T> {
    entries: DashMap<String, Entry<T>>,
    ttl: Duration,
}

impl<T> OAuthStateStore<T> {
    /// Build a store with the default 10-minute TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(STATE_TTL)
    }

    /// Build a store with an explicit TTL, mainly for tests that want to
    /// exercise expiry without sleeping.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Generate a fresh random `state` token and bind `value` to it.
    #[must_use]
    pub fn begin(&self, value: T) -> String {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.entries.insert(
            state.clone(),
            Entry {
                value,
                expires_at: Utc::now() + self.ttl,
            },
        );
        state
    }

    /// Consume `state`, returning its bound value if it exists and has not
    /// expired. One-shot: a state can only be redeemed once, preventing
    /// callback replay.
    pub fn consume(&self, state: &str) -> Option<T> {
        let (_, entry) = self.entries.remove(state)?;
        if entry.expires_at < Utc::now() {
            None
        } else {
            Some(entry.value)
        }
    }

    /// Drop every expired entry. Not required for correctness (expired
    /// entries are already rejected by [`Self::consume`]) but keeps the map
    /// from growing unbounded when flows are abandoned mid-way.
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| entry.expires_at >= now);
    }
}

impl<T> Default for OAuthStateStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
