// ABOUTME: Core data models for actors, login credentials, registrations and auth responses
// ABOUTME: Defines the TokenSubject capability implemented by anything that receives tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Data Models
//!
//! Secrets are wrapped in [`Zeroizing`] and redacted from `Debug` output.

use crate::constants::tokens::TOKEN_TYPE_BEARER;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Anything that can have tokens issued on its behalf
pub trait TokenSubject {
    /// Identity placed in the `sub` claim
    fn identity(&self) -> &str;
}

/// An authenticated principal as known to the user directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable user id, bound to refresh records
    pub id: String,
    /// Login identity, used as the token subject
    pub username: String,
}

impl Actor {
    /// Create an actor
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

impl TokenSubject for Actor {
    fn identity(&self) -> &str {
        &self.username
    }
}

impl TokenSubject for str {
    fn identity(&self) -> &str {
        self
    }
}

impl TokenSubject for String {
    fn identity(&self) -> &str {
        self
    }
}

/// Login request
#[derive(Clone)]
pub struct Credentials {
    /// Account identifier (e.g. email)
    pub account_id: String,
    /// Plaintext secret, handed straight to the credential verifier
    pub secret: Zeroizing<String>,
}

impl Credentials {
    /// Create credentials
    pub fn new(account_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Account creation request forwarded to the user registrar
#[derive(Clone)]
pub struct Registration {
    /// Display name
    pub name: String,
    /// Login identity
    pub email: String,
    /// Plaintext secret
    pub secret: Zeroizing<String>,
}

impl Registration {
    /// Create a registration request
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Access token plus its single-use refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Signed access token
    pub access_token: String,
    /// Opaque refresh token value
    pub refresh_token: String,
}

/// Response body for login, register and refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Signed access token
    pub access_token: String,
    /// Opaque refresh token value
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

impl AuthResponse {
    /// Bearer response for a freshly issued pair
    #[must_use]
    pub fn bearer(pair: TokenPair, expires_in: i64) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            expires_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_identity_is_username() {
        let actor = Actor::new("user-1", "user@example.com");
        assert_eq!(actor.identity(), "user@example.com");
    }

    #[test]
    fn test_secrets_are_redacted() {
        let credentials = Credentials::new("a@b.com", "hunter2");
        let registration = Registration::new("A", "a@b.com", "hunter2");

        assert!(!format!("{credentials:?}").contains("hunter2"));
        assert!(!format!("{registration:?}").contains("hunter2"));
    }

    #[test]
    fn test_bearer_response_shape() {
        let pair = TokenPair {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
        };
        let response = AuthResponse::bearer(pair, 3600);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
    }
}
