// ABOUTME: YAML-frontmatter-over-Markdown parsing for agent definitions
// ABOUTME: Grounded in the teacher's coach-definition parser; generalized from a fixed schema to the hub.toolkit subtree plus preserve-everything-else raw frontmatter

use hub_core::errors::{AppError, AppResult};
use hub_core::models::discovery::AgentToolkit;
use sha2::{Digest, Sha256};

/// One successfully parsed agent Markdown file.
#[derive(Debug, Clone)]
pub struct ParsedAgent {
    /// Display name: the frontmatter's `name` key if present, else the filename stem.
    pub name: String,
    /// Optional UI icon hint, read from `hub.icon`.
    pub icon: Option<String>,
    /// The writable `hub.toolkit` subtree.
    pub toolkit: AgentToolkit,
    /// Every other frontmatter key, preserved verbatim for round-trip.
    pub raw_frontmatter: serde_json::Value,
    /// sha256 hex digest of the raw file bytes.
    pub file_hash: String,
}

/// sha256 hex digest of `bytes`, used both to populate [`ParsedAgent::file_hash`]
/// and to detect whether a cached `Agent` row is stale against the file on disk.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Locate the `---`-delimited frontmatter block. Returns `(yaml_text, body_start_offset)`.
///
/// # Errors
/// Returns [`AppError::Internal`] if the file does not open with a
/// frontmatter block or the closing delimiter is missing — this is not a
/// Hub bug, so the caller maps it to a `broken` [`hub_core::models::discovery::AgentState`]
/// rather than propagating it as a system failure.
fn extract_frontmatter_block(content: &str) -> AppResult<(&str, usize)> {
    let trimmed = content.trim_start();
    let leading_ws = content.len() - trimmed.len();

    let after_open = trimmed.strip_prefix("---").ok_or_else(|| {
        AppError::Internal("file does not open with a YAML frontmatter block (---)".to_string())
    })?;

    let close_pos = after_open.find("\n---").ok_or_else(|| {
        AppError::Internal("missing closing frontmatter delimiter (---)".to_string())
    })?;

    let yaml_text = after_open[..close_pos].trim();
    let body_start = leading_ws + 3 + close_pos + 4;
    Ok((yaml_text, body_start.min(content.len())))
}

/// Parse `content` (the full raw file) into a [`ParsedAgent`]. `filename_stem`
/// is used as the display name fallback when frontmatter carries no `name` key.
///
/// # Errors
/// Returns [`AppError::Internal`] if the file has no frontmatter block, or
/// the frontmatter is not valid YAML, or it parses to something other than
/// a YAML mapping at the top level.
pub fn parse_agent(content: &str, filename_stem: &str) -> AppResult<ParsedAgent> {
    let (yaml_text, _body_start) = extract_frontmatter_block(content)?;

    let mut frontmatter: serde_json::Value = serde_yaml::from_str(yaml_text)
        .map_err(|e| AppError::Internal(format!("invalid YAML frontmatter: {e}")))?;

    let serde_json::Value::Object(ref mut top) = frontmatter else {
        return Err(AppError::Internal(
            "frontmatter must be a YAML mapping at the top level".to_string(),
        ));
    };

    let name = top
        .get("name")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| filename_stem.to_string());

    let hub_value = top.remove("hub").unwrap_or(serde_json::Value::Null);
    let (icon, toolkit) = if hub_value.is_null() {
        (None, AgentToolkit::default())
    } else {
        let icon = hub_value
            .get("icon")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let toolkit = hub_value
            .get("toolkit")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppError::Internal(format!("invalid hub.toolkit shape: {e}")))?
            .unwrap_or_default();
        (icon, toolkit)
    };

    Ok(ParsedAgent {
        name,
        icon,
        toolkit,
        raw_frontmatter: frontmatter,
        file_hash: hash_bytes(content.as_bytes()),
    })
}

/// Whether `content` even looks like a candidate Agent file (opens with a
/// frontmatter block). Used by the scanner to skip plain Markdown files
/// without incurring a full parse.
#[must_use]
pub fn looks_like_agent_file(content: &str) -> bool {
    content.trim_start().starts_with("---")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_icon_and_toolkit_from_frontmatter() {
        let content = r#"---
name: release-manager
description: cuts releases
hub:
  icon: rocket.svg
  toolkit:
    tools:
      - name: wait
        permissions: []
    inherit_project_tools: true
    last_configured: "2026-01-01T00:00:00Z"
    configured_by: admin@acme.test
---

# Release Manager

Body text.
"#;
        let parsed = parse_agent(content, "release-manager").expect("parse");
        assert_eq!(parsed.name, "release-manager");
        assert_eq!(parsed.icon, Some("rocket.svg".to_string()));
        assert_eq!(parsed.toolkit.tools.len(), 1);
        assert_eq!(parsed.toolkit.tools[0].name, "wait");
        assert!(parsed.toolkit.inherit_project_tools);
        assert_eq!(parsed.raw_frontmatter.get("description").and_then(|v| v.as_str()), Some("cuts releases"));
        assert!(parsed.raw_frontmatter.get("hub").is_none(), "hub subtree must not leak into raw_frontmatter");
    }

    #[test]
    fn falls_back_to_filename_and_empty_toolkit_when_hub_key_is_absent() {
        let content = "---\ndescription: no hub key here\n---\nbody\n";
        let parsed = parse_agent(content, "fallback-name").expect("parse");
        assert_eq!(parsed.name, "fallback-name");
        assert_eq!(parsed.icon, None);
        assert!(parsed.toolkit.tools.is_empty());
    }

    #[test]
    fn missing_frontmatter_is_rejected() {
        let err = parse_agent("just a markdown file\n", "x").expect_err("must fail");
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn missing_closing_delimiter_is_rejected() {
        let err = parse_agent("---\nname: x\nno closing delimiter\n", "x").expect_err("must fail");
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn same_bytes_hash_identically() {
        let a = hash_bytes(b"hello world");
        let b = hash_bytes(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, hash_bytes(b"hello world!"));
    }

    #[test]
    fn recognizes_candidate_agent_files_by_leading_delimiter() {
        assert!(looks_like_agent_file("---\nname: x\n---\n"));
        assert!(!looks_like_agent_file("# Just a heading\n"));
    }
}
