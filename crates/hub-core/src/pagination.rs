// ABOUTME: Cursor-based pagination for list endpoints
// ABOUTME: Provides opaque cursor encoding so callers can't infer internal row ids

use std::fmt::{self, Display, Formatter};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque pagination cursor containing encoded position information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    /// Create a new cursor from a timestamp and an id, for consistent
    /// ordering across pages.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, id: &str) -> Self {
        let cursor_data = format!("{}:{}", timestamp.timestamp_millis(), id);
        let encoded = base64::Engine::encode(&URL_SAFE_NO_PAD, cursor_data.as_bytes());
        Self(encoded)
    }

    /// Decode a cursor into its timestamp and id components.
    ///
    /// Returns `None` if the cursor is malformed.
    #[must_use]
    pub fn decode(&self) -> Option<(DateTime<Utc>, String)> {
        let decoded = base64::Engine::decode(&URL_SAFE_NO_PAD, &self.0).ok()?;
        let decoded_str = String::from_utf8(decoded).ok()?;
        let (timestamp_str, id) = decoded_str.split_once(':')?;
        let timestamp_millis = timestamp_str.parse::<i64>().ok()?;
        let datetime = DateTime::from_timestamp_millis(timestamp_millis)?;
        Some((datetime, id.to_owned()))
    }

    /// The raw cursor string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a cursor from a raw string, e.g. when deserializing a query param.
    #[must_use]
    pub const fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A page of items plus the cursors needed to fetch its neighbors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPage<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// Cursor pointing past the last item, if more items follow.
    pub next_cursor: Option<Cursor>,
    /// Whether there are more items after this page.
    pub has_more: bool,
}

impl<T> CursorPage<T> {
    /// Build a page from its items and whether more exist.
    #[must_use]
    pub fn new(items: Vec<T>, next_cursor: Option<Cursor>, has_more: bool) -> Self {
        Self {
            items,
            next_cursor,
            has_more,
        }
    }

    /// An empty page.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrips() {
        let now = Utc::now();
        let cursor = Cursor::new(now, "some-id");
        let (decoded_ts, decoded_id) = cursor.decode().expect("valid cursor");
        assert_eq!(decoded_id, "some-id");
        assert_eq!(decoded_ts.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn malformed_cursor_decodes_to_none() {
        let cursor = Cursor::from_string("not valid base64!!".to_string());
        assert!(cursor.decode().is_none());
    }
}
