// ABOUTME: Contracts for the external credential verifier, user directory and user registrar
// ABOUTME: The engine consumes these; password hashing and user storage live behind them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::errors::AppResult;
use crate::models::{Actor, Registration};
use async_trait::async_trait;

/// Checks an account secret
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Succeed if `secret` is valid for `account_id`
    ///
    /// # Errors
    ///
    /// Returns `BAD_CREDENTIALS` on rejection; any other error is propagated unchanged
    async fn verify(&self, account_id: &str, secret: &str) -> AppResult<()>;
}

/// Looks up actors
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find an actor by login identity
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unavailable
    async fn load_by_identity(&self, identity: &str) -> AppResult<Option<Actor>>;

    /// Find an actor by user id
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unavailable
    async fn load_by_id(&self, user_id: &str) -> AppResult<Option<Actor>>;
}

/// Creates accounts
#[async_trait]
pub trait UserRegistrar: Send + Sync {
    /// Persist a new account and return the created actor
    ///
    /// # Errors
    ///
    /// Returns `USER_ALREADY_EXISTS` on collision or any storage error
    async fn register(&self, registration: &Registration) -> AppResult<Actor>;
}
