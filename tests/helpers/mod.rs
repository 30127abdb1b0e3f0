// ABOUTME: Shared helpers for HTTP-layer integration tests
// ABOUTME: Only `axum_test` so far; mirrors the teacher's tests/helpers/ layout
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod axum_test;
