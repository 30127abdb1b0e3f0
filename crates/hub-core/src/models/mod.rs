// ABOUTME: Core data model shared between the Hub binary and its tests
// ABOUTME: Re-exports every domain entity: SystemConfig through AuditEvent

//! # Data Model
//!
//! One module per entity group. Each type
//! carries `serde` derives for the JSON API surface; `sqlx::FromRow` is
//! implemented where a type is read directly off a query row.

/// `SystemConfig` — the bootstrap singleton (app mode, encryption salt, KV).
pub mod system_config;

/// `Workspace`, `User` — the tenancy model.
pub mod tenancy;

/// `ToolRegistryEntry`, `UserTool`, `ToolConfig` — registry and activation.
pub mod tool;

/// `Credential` — sealed API keys and OAuth2 tokens.
pub mod credential;

/// `BaseFolder`, `Project`, `Agent` — the agent discovery model.
pub mod discovery;

/// `AuditEvent` — the append-only audit log.
pub mod audit;

pub use audit::{AuditActor, AuditCategory, AuditEvent, AuditTarget};
pub use credential::{Credential, CredentialKind};
pub use discovery::{Agent, AgentState, BaseFolder, Project};
pub use system_config::{AppMode, SystemConfig};
pub use tenancy::{User, Workspace};
pub use tool::{AuthType, ToolConfig, ToolRegistryEntry, UserTool};
