// ABOUTME: Configuration management module aggregating auth, throttling and rotation settings
// ABOUTME: Loads everything from environment variables and validates it before the engine starts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Configuration for the token lifecycle engine
//!
//! - **Auth**: secret seed plus access and refresh token lifetimes
//! - **Rate limiting**: login attempts per window
//! - **Key rotation**: scheduler interval and retired-key retention

use crate::errors::AppResult;
use std::env;
use tracing::info;

/// Token lifetimes, throttling and rotation settings
pub mod security;

pub use security::{AuthConfig, KeyRotationConfig, RateLimitConfig};

/// Complete engine configuration
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Token lifetimes and seed
    pub auth: AuthConfig,
    /// Login throttling
    pub rate_limit: RateLimitConfig,
    /// Signing key rotation
    pub key_rotation: KeyRotationConfig,
}

impl ServerConfig {
    /// Load and validate configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is malformed or out of range
    pub fn from_env() -> AppResult<Self> {
        let config = Self::from_lookup(&|key: &str| env::var(key).ok())?;
        info!("Loaded configuration: {}", config.summary());
        Ok(config)
    }

    /// Load and validate configuration from an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is malformed or out of range
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let config = Self {
            auth: AuthConfig::from_lookup(lookup)?,
            rate_limit: RateLimitConfig::from_lookup(lookup)?,
            key_rotation: KeyRotationConfig::from_lookup(lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns the first validation failure
    pub fn validate(&self) -> AppResult<()> {
        self.auth.validate()?;
        self.rate_limit.validate()?;
        self.key_rotation.validate()?;
        self.key_rotation
            .validate_against(self.auth.access_token_ttl())
    }

    /// One-line description safe for startup logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "access_ttl={}s refresh_ttl={}s seed={} login_attempts={} login_window={}s rotation={} every {}s retention={}s",
            self.auth.access_token_ttl().num_seconds(),
            self.auth.refresh_token_ttl().num_seconds(),
            if self.auth.secret_seed.is_some() { "configured" } else { "random" },
            self.rate_limit.login_attempts,
            self.rate_limit.login_duration_secs,
            if self.key_rotation.enabled { "enabled" } else { "disabled" },
            self.key_rotation.interval_secs,
            self.key_rotation
                .retention(self.auth.access_token_ttl())
                .num_seconds(),
        )
    }
}
