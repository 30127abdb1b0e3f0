// ABOUTME: Core domain types for the multi-tenant MCP Tool Hub
// ABOUTME: Foundation crate with error handling, data models, pagination, and permission evaluation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Hub Contributors

#![deny(unsafe_code)]

//! # Hub Core
//!
//! Foundation crate shared between the Hub binary and its integration tests.
//! Kept dependency-light and free of I/O so it changes infrequently and
//! compiles fast.
//!
//! ## Modules
//!
//! - **errors**: unified `AppError` taxonomy with HTTP status mapping
//! - **models**: the Hub's data model (workspaces, users, tool registry
//!   entries, activations, credentials, discovery entities, audit events)
//! - **permissions**: the pure, I/O-free three-tier permission evaluator
//! - **pagination**: cursor-based pagination for list endpoints

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Core data model: workspaces, users, tools, credentials, discovery, audit
pub mod models;

/// Pure three-tier permission evaluator (platform admin / workspace user / agent toolkit)
pub mod permissions;

/// Cursor-based pagination for list endpoints
pub mod pagination;
