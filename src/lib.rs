// ABOUTME: Main library entry point for the tokenward token lifecycle engine
// ABOUTME: Rotating-key access tokens, single-use refresh tokens and login throttling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Tokenward
//!
//! Issues and verifies short-lived bearer tokens backed by revocable refresh
//! tokens, and throttles login attempts per client and account.
//!
//! ## Features
//!
//! - **Key rotation**: HMAC-SHA512 keys rotate on a schedule; every token carries
//!   the `kid` of its signing key so older tokens verify until they expire
//! - **Rotation-on-use refresh tokens**: each refresh value redeems exactly once
//! - **Login throttling**: per `(client, account)` token buckets
//!
//! ## Architecture
//!
//! - **`signing_keys`** / **`key_rotation`**: key store and its rotation task
//! - **`auth`**: access token codec
//! - **`refresh_tokens`**: refresh records, repository contract and lifecycle
//! - **`rate_limiting`**: login token buckets
//! - **`services`**: login, register and refresh orchestration
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokenward::config::ServerConfig;
//! use tokenward::errors::AppResult;
//! use tokenward::refresh_tokens::InMemoryRefreshTokenRepository;
//! use tokenward::services::{AuthCollaborators, AuthService};
//!
//! # async fn example(collaborators: AuthCollaborators) -> AppResult<()> {
//! let config = ServerConfig::from_env()?;
//! let (auth, rotation) = AuthService::bootstrap(
//!     &config,
//!     collaborators,
//!     Arc::new(InMemoryRefreshTokenRepository::new()),
//! )?;
//!
//! let tokens = auth.refresh("opaque-refresh-value").await?;
//! let subject = auth.verify_access_token(&tokens.access_token)?;
//! println!("refreshed session for {subject}");
//!
//! if let Some(handle) = rotation {
//!     handle.shutdown().await?;
//! }
//! # Ok(())
//! # }
//! ```

/// Access token codec
pub mod auth;

/// Injectable time source
pub mod clock;

/// External collaborator contracts
pub mod collaborators;

/// Configuration management
pub mod config;

/// Configuration defaults and environment variable names
pub mod constants;

/// Unified error handling
pub mod errors;

/// Scheduled signing key rotation
pub mod key_rotation;

/// Structured logging setup
pub mod logging;

/// Actors, credentials and auth responses
pub mod models;

/// Login throttling
pub mod rate_limiting;

/// Refresh token lifecycle
pub mod refresh_tokens;

/// Auth orchestration services
pub mod services;

/// Signing key store
pub mod signing_keys;
