// ABOUTME: Main library entry point for the multi-tenant MCP Tool Hub
// ABOUTME: Wires C1-C14 components together behind the Axum front door and the hub-mcp-server binary
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![recursion_limit = "256"]
#![deny(unsafe_code)]

//! # MCP Tool Hub
//!
//! A multi-tenant Hub that lets authenticated users compose a personal
//! collection of Model Context Protocol (MCP) tools and expose them, as one
//! aggregate MCP endpoint, to MCP clients.
//!
//! ## Architecture
//!
//! The Hub follows a component layout mirrored 1:1 from its design
//! document (`C1`-`C14`):
//! - **Crypto** ([`crypto`]) — machine-bound symmetric encryption.
//! - **Data Store** ([`database`]) — dual-pool SQLite persistence.
//! - **Mode Manager** ([`mode`]) — the `UNCONFIGURED -> LOCAL | WORKOS` bootstrap machine.
//! - **Identity** ([`identity`]) — the `LOCAL`/`WORKOS` `Authenticator` adapters.
//! - **Tenancy** ([`tenancy`]) — workspace isolation helpers.
//! - **Credential Vault** ([`vault`]) — sealed API keys and OAuth2 token sets.
//! - **Tool Registry** ([`registry`]) — the filesystem-scanned tool catalogue.
//! - **Activation Manager** ([`activation`]) — per-user tool enablement and config.
//! - **Tool Proxy** ([`proxy`]) — per-user isolated child MCP sessions.
//! - **Agent Discovery** ([`discovery`]) — the scan/parse/watch/write-back pipeline.
//! - **MCP Front Door** ([`http`]) — the Axum router and its middleware chain.
//! - **Audit** ([`audit`]) — the append-only, fire-and-forget event log.
//!
//! Domain models, the error taxonomy, and the pure permission evaluator live
//! in the sibling `hub-core` crate and are re-exported from there by every
//! module above rather than duplicated here.

/// Activation Manager (C10) — `(workspace, tool)` enablement and per-user configuration.
pub mod activation;

/// Audit (C14) — buffered, fire-and-forget append-only event log.
pub mod audit;

/// Bootstrap configuration (C3 env layer) — CLI flags and `HUB_*` env vars read once at startup.
pub mod config;

/// Cryptographic utilities (C1) — machine-bound key derivation and authenticated encryption.
pub mod crypto;

/// Multi-tenant database management (C2) — dual-pool SQLite store and migrations.
pub mod database;

/// Agent Discovery (C12) — scan, parse, cache, watch, and write back agent frontmatter.
pub mod discovery;

/// MCP Front Door (C13) — the Axum router, middleware chain, and route handlers.
pub mod http;

/// LOCAL/WORKOS identity adapters (C5).
pub mod identity;

/// Production logging and structured output.
pub mod logging;

/// Bootstrap state machine gating all non-setup traffic (C4).
pub mod mode;

/// Ephemeral state store for OAuth authorize-flow round trips, shared by C5 and C8.
pub mod oauth_state;

/// Tool Proxy (C11) — per-user isolated child MCP sessions and the call pipeline.
pub mod proxy;

/// Tool Registry (C9) — filesystem-scanned catalogue of installable tools.
pub mod registry;

/// Tenancy (C6) — workspace resolution and the cross-workspace guard.
pub mod tenancy;

/// Credential Vault (C8) — per-user API keys and OAuth2 token sets, sealed at rest.
pub mod vault;
