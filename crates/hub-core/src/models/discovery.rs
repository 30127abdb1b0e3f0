// ABOUTME: BaseFolder, Project, Agent — the agent discovery model
// ABOUTME: A BaseFolder is a scan root; Projects are discovered git repos; Agents are frontmatter files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A filesystem root the Hub has been granted permission to scan (C12).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BaseFolder {
    /// Primary key.
    pub id: Uuid,
    /// Owning workspace.
    pub workspace_id: Uuid,
    /// Absolute filesystem path.
    pub path: String,
    /// Display label shown in the UI.
    pub label: String,
}

/// One discovered git repository under a `BaseFolder`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    /// Primary key.
    pub id: Uuid,
    /// Owning `BaseFolder`.
    pub base_folder_id: Uuid,
    /// Repository directory name.
    pub name: String,
    /// Absolute path to the repository root.
    pub absolute_path: String,
    /// Last time a scan completed for this project.
    pub last_scanned_at: DateTime<Utc>,
}

/// Lifecycle of a discovered `Agent` row.
///
/// `fresh -> (file changed) -> dirty -> (reparse ok) -> fresh`, or
/// `dirty -> (reparse failed) -> broken`. Broken agents are listed with an
/// error message and are not callable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentState {
    /// Cache matches the file on disk.
    Fresh,
    /// The file changed since the cache was last populated; not yet reparsed.
    Dirty,
    /// The last reparse attempt failed; not callable until fixed.
    Broken {
        /// Human-readable parse failure, shown in listings.
        error: String,
    },
}

impl AgentState {
    /// Discriminant stored in the `agents.state` column. The `Broken` reason
    /// lives in the sibling nullable `agents.state_error` column — this type
    /// never round-trips through a single `sqlx::Type` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Dirty => "dirty",
            Self::Broken { .. } => "broken",
        }
    }

    /// Reconstruct from the `(state, state_error)` column pair.
    ///
    /// # Errors
    /// Returns the discriminant string if it is not recognized, or if
    /// `"broken"` was stored with no accompanying error.
    pub fn from_columns(state: &str, state_error: Option<String>) -> Result<Self, &str> {
        match state {
            "fresh" => Ok(Self::Fresh),
            "dirty" => Ok(Self::Dirty),
            "broken" => Ok(Self::Broken {
                error: state_error.unwrap_or_default(),
            }),
            other => Err(other),
        }
    }
}

/// A Markdown file under a `Project`'s agents directory that opens with a
/// YAML frontmatter block.
///
/// `(project_id, relative_path)` is unique. `file_hash` is the sha256 of the
/// raw file bytes as of the last successful parse; a mismatch against the
/// current file marks the entry dirty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Primary key.
    pub id: Uuid,
    /// Owning `Project`.
    pub project_id: Uuid,
    /// Path to the Markdown file, relative to the project root.
    pub relative_path: String,
    /// Display name, taken from frontmatter or the filename.
    pub name: String,
    /// Opaque UI icon hint.
    pub icon: Option<String>,
    /// sha256 of the file's raw bytes as of the last successful parse.
    pub file_hash: String,
    /// The writable `hub.toolkit` subtree.
    pub toolkit: AgentToolkit,
    /// Every other frontmatter key, preserved verbatim for round-trip.
    pub raw_frontmatter: serde_json::Value,
    /// Current lifecycle state.
    pub state: AgentState,
    /// Last time this row was written (DB or file).
    pub updated_at: DateTime<Utc>,
}

/// One entry under `hub.toolkit.tools`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AgentToolGrant {
    /// Tool name this agent may invoke.
    pub name: String,
    /// Permissions scoping the grant (opaque strings, tool-defined).
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// The writable `hub.toolkit` subtree, round-tripped byte-identically when
/// unchanged (the frontmatter roundtrip property).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AgentToolkit {
    /// Tools this agent may invoke; presence in this list means enabled.
    #[serde(default)]
    pub tools: Vec<AgentToolGrant>,
    /// Whether this agent additionally inherits its project's enabled tools.
    #[serde(default)]
    pub inherit_project_tools: bool,
    /// When this toolkit was last written, ISO-8601.
    #[serde(default)]
    pub last_configured: Option<DateTime<Utc>>,
    /// Email of whoever last wrote this toolkit.
    #[serde(default)]
    pub configured_by: Option<String>,
}
