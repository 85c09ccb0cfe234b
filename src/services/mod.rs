// ABOUTME: Domain service layer composing keys, tokens, refresh records and throttling
// ABOUTME: Provides protocol-agnostic auth flows for whatever HTTP layer sits in front
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Domain service layer
//!
//! Services hold no transport concerns; the surrounding API layer maps
//! their [`crate::errors::AppError`] codes to HTTP responses.

/// Login, registration and refresh orchestration
pub mod auth;

pub use auth::{AuthCollaborators, AuthService};
