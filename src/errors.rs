// ABOUTME: Unified error handling with stable error codes for the token lifecycle engine
// ABOUTME: Maps rate-limit, credential, refresh and validation failures to tagged variants and HTTP statuses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Unified Error Handling
//!
//! Every fallible operation in this crate returns [`AppResult`]. Callers branch
//! on [`AppError::code`] instead of matching on message strings, so "not found",
//! "revoked" and "rate limited" are ordinary values rather than control flow.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error codes surfaced to the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Too many login attempts for the `(client, account)` pair
    RateLimitExceeded,
    /// The external authenticator rejected the credentials
    BadCredentials,
    /// No refresh record matches the presented value
    RefreshNotFound,
    /// Refresh record exists but is expired or revoked
    RefreshInvalid,
    /// Access token is malformed, badly signed or expired
    TokenValidationFailed,
    /// The actor bound to a token no longer exists
    UserNotFound,
    /// Registration collided with an existing account
    UserAlreadyExists,
    /// Caller supplied an unusable argument
    InvalidInput,
    /// Configuration value missing or out of range
    ConfigInvalid,
    /// Refresh-token persistence failed
    StorageError,
    /// Random generation or signing failed; the crypto subsystem is unusable
    CryptoFailure,
    /// Anything else
    InternalError,
}

impl ErrorCode {
    /// HTTP status code the surrounding API layer should answer with
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::BadCredentials | Self::TokenValidationFailed => 401,
            // A dead refresh token means "session expired, log in again"
            Self::RefreshNotFound | Self::RefreshInvalid => 403,
            Self::UserNotFound => 404,
            Self::UserAlreadyExists => 409,
            Self::RateLimitExceeded => 429,
            Self::StorageError => 503,
            Self::ConfigInvalid | Self::CryptoFailure | Self::InternalError => 500,
        }
    }

    /// User-facing description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "Too many login attempts, retry later",
            Self::BadCredentials => "The provided credentials are invalid",
            Self::RefreshNotFound | Self::RefreshInvalid => "Session expired, please log in again",
            Self::TokenValidationFailed => "The access token is invalid or expired",
            Self::UserNotFound => "User not found",
            Self::UserAlreadyExists => "User already exists",
            Self::InvalidInput => "The provided input is invalid",
            Self::ConfigInvalid => "Configuration is invalid",
            Self::StorageError => "Token storage is unavailable",
            Self::CryptoFailure => "Cryptographic subsystem failure",
            Self::InternalError => "An internal error occurred",
        }
    }
}

/// Unified error type for the crate
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Structured details for the API layer (retry hints, keys, ...)
    pub details: serde_json::Value,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
            source: None,
        }
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Both refresh failures collapse into the same "log in again" outcome
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::RefreshNotFound | ErrorCode::RefreshInvalid
        )
    }

    /// Failures the API layer answers with "unauthenticated", never a 5xx
    #[must_use]
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::TokenValidationFailed | ErrorCode::BadCredentials
        )
    }

    /// Failures that indicate an unusable cryptographic subsystem
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.code, ErrorCode::CryptoFailure)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Convenience constructors for common errors
impl AppError {
    /// Login attempts exhausted for the given rate-limit key
    pub fn rate_limit_exceeded(key: &str, retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            format!("Too many login attempts, retry after {retry_after_secs} seconds"),
        )
        .with_details(serde_json::json!({
            "key": key,
            "retry_after_secs": retry_after_secs,
        }))
    }

    /// Authenticator rejected the credentials
    pub fn bad_credentials(account_id: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::BadCredentials,
            format!("Invalid credentials for {}", account_id.into()),
        )
    }

    /// Refresh token lookup missed
    pub fn refresh_not_found() -> Self {
        Self::new(ErrorCode::RefreshNotFound, "Refresh token not found")
    }

    /// Refresh token expired or revoked
    pub fn refresh_invalid() -> Self {
        Self::new(ErrorCode::RefreshInvalid, "Refresh token expired or revoked")
    }

    /// Access token rejected
    pub fn token_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TokenValidationFailed, message)
    }

    /// Actor lookup missed
    pub fn user_not_found(user: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::UserNotFound,
            format!("User not found: {}", user.into()),
        )
    }

    /// Registration collided with an existing account
    pub fn user_already_exists(account_id: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::UserAlreadyExists,
            format!("Account already registered: {}", account_id.into()),
        )
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Refresh-token store failure
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    /// Random generation or signing failure
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CryptoFailure, message)
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// Conversion from `anyhow::Error` used at the bootstrap edge
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        match error.chain().nth(1) {
            Some(source) => Self::internal(error.to_string()).with_details(serde_json::json!({
                "source": source.to_string()
            })),
            None => Self::internal(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::RateLimitExceeded.http_status(), 429);
        assert_eq!(ErrorCode::BadCredentials.http_status(), 401);
        assert_eq!(ErrorCode::RefreshInvalid.http_status(), 403);
        assert_eq!(ErrorCode::RefreshNotFound.http_status(), 403);
        assert_eq!(ErrorCode::TokenValidationFailed.http_status(), 401);
        assert_eq!(ErrorCode::CryptoFailure.http_status(), 500);
    }

    #[test]
    fn test_refresh_failures_share_user_outcome() {
        let not_found = AppError::refresh_not_found();
        let invalid = AppError::refresh_invalid();

        assert!(not_found.is_session_expired());
        assert!(invalid.is_session_expired());
        assert_eq!(not_found.code.description(), invalid.code.description());
        assert!(!AppError::bad_credentials("a@b.com").is_session_expired());
    }

    #[test]
    fn test_unauthenticated_never_fatal() {
        let error = AppError::token_validation("bad signature");
        assert!(error.is_unauthenticated());
        assert!(!error.is_fatal());
        assert!(AppError::crypto("rng down").is_fatal());
    }

    #[test]
    fn test_rate_limit_details_serialize() {
        let error = AppError::rate_limit_exceeded("login_1.2.3.4_a@b.com", 42);
        let code = serde_json::to_string(&error.code).unwrap();

        assert_eq!(code, "\"RATE_LIMIT_EXCEEDED\"");
        assert_eq!(error.details["retry_after_secs"], 42);
        assert_eq!(error.details["key"], "login_1.2.3.4_a@b.com");
    }
}
