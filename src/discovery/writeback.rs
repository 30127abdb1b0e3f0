// ABOUTME: Surgical hub.toolkit region replacement in an agent's frontmatter, leaving every other byte untouched
// ABOUTME: No crate in the reference corpus does comment-preserving YAML editing, so the hub: block is treated as a line-addressable text region rather than round-tripped through a generic YAML document model — see DESIGN.md

use hub_core::errors::{AppError, AppResult};
use hub_core::models::discovery::AgentToolkit;

/// Render the `hub:` block (icon + toolkit) as a standalone YAML mapping,
/// two-space indented, with no trailing blank line. Deterministic for a
/// given input so two writes of unchanged data are byte-identical (the
/// roundtrip property write-back depends on).
fn render_hub_block(icon: Option<&str>, toolkit: &AgentToolkit) -> AppResult<String> {
    let mut hub = serde_json::Map::new();
    if let Some(icon) = icon {
        hub.insert("icon".to_string(), serde_json::Value::String(icon.to_string()));
    }
    hub.insert(
        "toolkit".to_string(),
        serde_json::to_value(toolkit).map_err(|e| AppError::Internal(format!("toolkit serialization failed: {e}")))?,
    );

    let doc = serde_json::json!({ "hub": serde_json::Value::Object(hub) });
    let yaml = serde_yaml::to_string(&doc)
        .map_err(|e| AppError::Internal(format!("yaml rendering failed: {e}")))?;

    // serde_yaml always emits a leading "---\n" document marker and a
    // trailing newline; strip both since we are splicing into an existing
    // frontmatter block, not emitting a standalone document.
    Ok(yaml
        .strip_prefix("---\n")
        .unwrap_or(&yaml)
        .trim_end_matches('\n')
        .to_string())
}

/// `(start_line, end_line_exclusive)` of the frontmatter block's YAML body,
/// i.e. the lines strictly between the opening and closing `---` delimiters.
fn frontmatter_line_range(lines: &[&str]) -> AppResult<(usize, usize)> {
    if lines.first().map(|l| l.trim()) != Some("---") {
        return Err(AppError::Internal("file does not open with a frontmatter delimiter".to_string()));
    }
    let close = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, l)| l.trim() == "---")
        .map(|(i, _)| i)
        .ok_or_else(|| AppError::Internal("missing closing frontmatter delimiter".to_string()))?;
    Ok((1, close))
}

/// Within `lines[body_start..body_end)`, find the `(start, end_exclusive)`
/// line range of a top-level `hub:` key, if one exists. A top-level key is
/// a line with no leading whitespace; the key's block extends until the
/// next such line or `body_end`.
fn find_hub_block(lines: &[&str], body_start: usize, body_end: usize) -> Option<(usize, usize)> {
    let start = (body_start..body_end).find(|&i| lines[i].starts_with("hub:") || lines[i].trim() == "hub:")?;
    let end = (start + 1..body_end)
        .find(|&i| !lines[i].is_empty() && !lines[i].starts_with(' ') && !lines[i].starts_with('\t'))
        .unwrap_or(body_end);
    Some((start, end))
}

/// Replace (or insert) the `hub:` subtree in `original_content`, leaving
/// every other line byte-identical. Returns the new full file content.
///
/// # Errors
/// Returns [`AppError::Internal`] if `original_content` has no valid
/// frontmatter block, or the new block cannot be rendered as YAML.
pub fn write_toolkit(
    original_content: &str,
    icon: Option<&str>,
    toolkit: &AgentToolkit,
) -> AppResult<String> {
    let lines: Vec<&str> = original_content.lines().collect();
    let (body_start, body_end) = frontmatter_line_range(&lines)?;
    let rendered = render_hub_block(icon, toolkit)?;

    let (replace_start, replace_end) = find_hub_block(&lines, body_start, body_end)
        .unwrap_or((body_end, body_end));

    let mut out_lines: Vec<&str> = Vec::with_capacity(lines.len());
    out_lines.extend_from_slice(&lines[..replace_start]);
    let rendered_lines: Vec<&str> = rendered.lines().collect();
    out_lines.extend(rendered_lines.iter().copied());
    out_lines.extend_from_slice(&lines[replace_end..]);

    let had_trailing_newline = original_content.ends_with('\n');
    let mut result = out_lines.join("\n");
    if had_trailing_newline {
        result.push('\n');
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::models::discovery::AgentToolGrant;

    fn toolkit(names: &[&str]) -> AgentToolkit {
        AgentToolkit {
            tools: names
                .iter()
                .map(|n| AgentToolGrant {
                    name: (*n).to_string(),
                    permissions: vec![],
                })
                .collect(),
            inherit_project_tools: true,
            last_configured: None,
            configured_by: None,
        }
    }

    #[test]
    fn replaces_an_existing_hub_block_leaving_surrounding_keys_untouched() {
        let original = "---\nname: release-manager\nhub:\n  toolkit:\n    tools:\n    - name: a\ndescription: untouched\n---\n\nBody.\n";
        let updated = write_toolkit(original, None, &toolkit(&["a", "b"])).expect("write");

        assert!(updated.contains("name: release-manager"));
        assert!(updated.contains("description: untouched"));
        assert!(updated.contains("Body."));
        assert!(updated.contains("- name: a"));
        assert!(updated.contains("- name: b"));
    }

    #[test]
    fn inserts_a_hub_block_when_none_exists() {
        let original = "---\nname: no-hub-yet\n---\nBody.\n";
        let updated = write_toolkit(original, Some("icon.svg"), &toolkit(&["a"])).expect("write");

        assert!(updated.contains("name: no-hub-yet"));
        assert!(updated.contains("hub:"));
        assert!(updated.contains("icon: icon.svg"));
        assert!(updated.contains("Body."));
    }

    #[test]
    fn unchanged_toolkit_roundtrips_byte_identically() {
        let original = "---\nname: x\nhub:\n  toolkit:\n    tools:\n    - name: a\n      permissions: []\n    inherit_project_tools: true\n---\nBody.\n";
        let current = toolkit(&["a"]);
        let first = write_toolkit(original, None, &current).expect("first write");
        let second = write_toolkit(&first, None, &current).expect("second write");
        assert_eq!(first, second, "writing the same toolkit twice must be idempotent");
    }

    #[test]
    fn missing_frontmatter_is_rejected() {
        let err = write_toolkit("no frontmatter here\n", None, &toolkit(&[])).expect_err("must fail");
        assert!(matches!(err, AppError::Internal(_)));
    }
}
