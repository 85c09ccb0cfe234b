// ABOUTME: Security configuration types for token lifetimes, login throttling and key rotation
// ABOUTME: Parses the JWT, rate-limit and rotation environment variables with validated defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::constants::{bounds, crypto, env_vars, limits, rotation, tokens};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

/// Authentication configuration for access and refresh tokens
#[derive(Clone)]
pub struct AuthConfig {
    /// Seed for the first signing key; rotation replaces it
    pub secret_seed: Option<Zeroizing<String>>,
    /// Access token lifetime in milliseconds
    pub access_token_expiration_ms: u64,
    /// Refresh token lifetime in milliseconds
    pub refresh_token_expiration_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_seed: None,
            access_token_expiration_ms: tokens::DEFAULT_ACCESS_TOKEN_EXPIRATION_MS,
            refresh_token_expiration_ms: tokens::DEFAULT_REFRESH_TOKEN_EXPIRATION_MS,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "secret_seed",
                &self.secret_seed.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "access_token_expiration_ms",
                &self.access_token_expiration_ms,
            )
            .field(
                "refresh_token_expiration_ms",
                &self.refresh_token_expiration_ms,
            )
            .finish()
    }
}

impl AuthConfig {
    /// Load authentication configuration from a variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if a lifetime is not a valid integer
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        Ok(Self {
            secret_seed: lookup(env_vars::JWT_SECRET_SEED)
                .filter(|seed| !seed.is_empty())
                .map(Zeroizing::new),
            access_token_expiration_ms: parse_var(
                lookup,
                env_vars::JWT_ACCESS_TOKEN_EXPIRATION,
                tokens::DEFAULT_ACCESS_TOKEN_EXPIRATION_MS,
            )?,
            refresh_token_expiration_ms: parse_var(
                lookup,
                env_vars::JWT_REFRESH_TOKEN_EXPIRATION,
                tokens::DEFAULT_REFRESH_TOKEN_EXPIRATION_MS,
            )?,
        })
    }

    /// Access token lifetime
    #[must_use]
    pub fn access_token_ttl(&self) -> chrono::Duration {
        millis_to_duration(self.access_token_expiration_ms)
    }

    /// Refresh token lifetime
    #[must_use]
    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        millis_to_duration(self.refresh_token_expiration_ms)
    }

    /// Validate lifetimes and seed length
    ///
    /// # Errors
    ///
    /// Returns an error if a lifetime is zero or out of range, or the seed is too short
    pub fn validate(&self) -> AppResult<()> {
        check_bounded(
            env_vars::JWT_ACCESS_TOKEN_EXPIRATION,
            self.access_token_expiration_ms,
            bounds::MAX_DURATION_MS,
        )?;
        check_bounded(
            env_vars::JWT_REFRESH_TOKEN_EXPIRATION,
            self.refresh_token_expiration_ms,
            bounds::MAX_DURATION_MS,
        )?;
        if let Some(seed) = &self.secret_seed {
            if seed.len() < crypto::MIN_SECRET_SEED_LENGTH {
                return Err(AppError::config(format!(
                    "{} must be at least {} bytes",
                    env_vars::JWT_SECRET_SEED,
                    crypto::MIN_SECRET_SEED_LENGTH
                )));
            }
        }
        Ok(())
    }
}

/// Login throttling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Attempts allowed per window
    pub login_attempts: u32,
    /// Window length in seconds; the bucket refills fully once per window
    pub login_duration_secs: u64,
    /// Bucket count above which idle buckets are evicted
    pub cleanup_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_attempts: limits::DEFAULT_LOGIN_ATTEMPTS,
            login_duration_secs: limits::DEFAULT_LOGIN_DURATION_SECS,
            cleanup_threshold: limits::DEFAULT_RATE_LIMIT_CLEANUP_THRESHOLD,
        }
    }
}

impl RateLimitConfig {
    /// Load rate limit configuration from a variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if a value is not a valid integer
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        Ok(Self {
            login_attempts: parse_var(
                lookup,
                env_vars::RATE_LIMIT_LOGIN_ATTEMPTS,
                limits::DEFAULT_LOGIN_ATTEMPTS,
            )?,
            login_duration_secs: parse_var(
                lookup,
                env_vars::RATE_LIMIT_LOGIN_DURATION,
                limits::DEFAULT_LOGIN_DURATION_SECS,
            )?,
            cleanup_threshold: parse_var(
                lookup,
                env_vars::RATE_LIMIT_CLEANUP_THRESHOLD,
                limits::DEFAULT_RATE_LIMIT_CLEANUP_THRESHOLD,
            )?,
        })
    }

    /// Refill period of each bucket
    #[must_use]
    pub fn window(&self) -> chrono::Duration {
        secs_to_duration(self.login_duration_secs)
    }

    /// Validate capacity and window
    ///
    /// # Errors
    ///
    /// Returns an error if capacity is zero or the window is zero or out of range
    pub fn validate(&self) -> AppResult<()> {
        if self.login_attempts == 0 {
            return Err(AppError::config(format!(
                "{} must be greater than zero",
                env_vars::RATE_LIMIT_LOGIN_ATTEMPTS
            )));
        }
        check_bounded(
            env_vars::RATE_LIMIT_LOGIN_DURATION,
            self.login_duration_secs,
            bounds::MAX_DURATION_SECS,
        )
    }
}

/// Signing key rotation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRotationConfig {
    /// Run the background rotation task
    pub enabled: bool,
    /// Seconds between scheduled rotations
    pub interval_secs: u64,
    /// Seconds a retired key stays available for verification; `None` uses the access TTL
    pub retention_secs: Option<u64>,
}

impl Default for KeyRotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: rotation::DEFAULT_KEY_ROTATION_INTERVAL_SECS,
            retention_secs: None,
        }
    }
}

impl KeyRotationConfig {
    /// Load rotation configuration from a variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let retention_secs = match lookup(env_vars::KEY_RETENTION_SECS) {
            Some(raw) => Some(raw.trim().parse().map_err(|e| {
                AppError::config(format!("Invalid {} value: {e}", env_vars::KEY_RETENTION_SECS))
            })?),
            None => None,
        };

        Ok(Self {
            enabled: parse_var(lookup, env_vars::KEY_ROTATION_ENABLED, true)?,
            interval_secs: parse_var(
                lookup,
                env_vars::KEY_ROTATION_INTERVAL_SECS,
                rotation::DEFAULT_KEY_ROTATION_INTERVAL_SECS,
            )?,
            retention_secs,
        })
    }

    /// Period of the rotation ticker
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Effective retention for retired keys
    #[must_use]
    pub fn retention(&self, access_token_ttl: chrono::Duration) -> chrono::Duration {
        self.retention_secs
            .map_or(access_token_ttl, secs_to_duration)
    }

    /// Validate the rotation interval and explicit retention
    ///
    /// # Errors
    ///
    /// Returns an error if rotation is enabled with a zero interval, or a value is out of range
    pub fn validate(&self) -> AppResult<()> {
        if self.enabled {
            check_bounded(
                env_vars::KEY_ROTATION_INTERVAL_SECS,
                self.interval_secs,
                bounds::MAX_DURATION_SECS,
            )?;
        }
        if let Some(retention) = self.retention_secs {
            if retention > bounds::MAX_DURATION_SECS {
                return Err(AppError::config(format!(
                    "{} must not exceed {}",
                    env_vars::KEY_RETENTION_SECS,
                    bounds::MAX_DURATION_SECS
                )));
            }
        }
        Ok(())
    }

    /// Reject a retention shorter than the access token lifetime
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` if tokens could outlive the key that signed them
    pub fn validate_against(&self, access_token_ttl: chrono::Duration) -> AppResult<()> {
        if self.retention(access_token_ttl) < access_token_ttl {
            return Err(AppError::config(format!(
                "{} must be at least the access token lifetime ({}s)",
                env_vars::KEY_RETENTION_SECS,
                access_token_ttl.num_seconds()
            )));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e| AppError::config(format!("Invalid {key} value: {e}")))
    })
}

fn check_bounded(key: &str, value: u64, max: u64) -> AppResult<()> {
    if value == 0 {
        return Err(AppError::config(format!("{key} must be greater than zero")));
    }
    if value > max {
        return Err(AppError::config(format!("{key} must not exceed {max}")));
    }
    Ok(())
}

fn millis_to_duration(millis: u64) -> chrono::Duration {
    chrono::Duration::try_milliseconds(i64::try_from(millis).unwrap_or(i64::MAX))
        .unwrap_or(chrono::Duration::MAX)
}

fn secs_to_duration(secs: u64) -> chrono::Duration {
    chrono::Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX))
        .unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let lookup = lookup_from(&[]);
        let auth = AuthConfig::from_lookup(&lookup).unwrap();
        let rate = RateLimitConfig::from_lookup(&lookup).unwrap();

        assert_eq!(auth.access_token_ttl(), chrono::Duration::hours(1));
        assert_eq!(auth.refresh_token_ttl(), chrono::Duration::hours(24));
        assert!(auth.secret_seed.is_none());
        assert_eq!(rate.login_attempts, 5);
        assert_eq!(rate.window(), chrono::Duration::seconds(60));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let lookup = lookup_from(&[(env_vars::JWT_ACCESS_TOKEN_EXPIRATION, "soon")]);
        let error = AuthConfig::from_lookup(&lookup).unwrap_err();

        assert_eq!(error.code, crate::errors::ErrorCode::ConfigInvalid);
        assert!(error.message.contains(env_vars::JWT_ACCESS_TOKEN_EXPIRATION));
    }

    #[test]
    fn test_short_seed_rejected() {
        let lookup = lookup_from(&[(env_vars::JWT_SECRET_SEED, "too-short")]);
        let auth = AuthConfig::from_lookup(&lookup).unwrap();

        assert!(auth.validate().is_err());
        assert!(!format!("{auth:?}").contains("too-short"));
    }

    #[test]
    fn test_retention_defaults_to_access_ttl() {
        let rotation = KeyRotationConfig::default();
        let ttl = chrono::Duration::minutes(15);
        assert_eq!(rotation.retention(ttl), ttl);

        let lookup = lookup_from(&[(env_vars::KEY_RETENTION_SECS, "120")]);
        let rotation = KeyRotationConfig::from_lookup(&lookup).unwrap();
        assert_eq!(rotation.retention(ttl), chrono::Duration::seconds(120));
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let lookup = lookup_from(&[(env_vars::JWT_ACCESS_TOKEN_EXPIRATION, "9000000000000000")]);
        let auth = AuthConfig::from_lookup(&lookup).unwrap();
        assert_eq!(
            auth.validate().unwrap_err().code,
            crate::errors::ErrorCode::ConfigInvalid
        );

        let lookup = lookup_from(&[(env_vars::KEY_RETENTION_SECS, "18446744073709551615")]);
        let rotation = KeyRotationConfig::from_lookup(&lookup).unwrap();
        assert!(rotation.validate().is_err());

        let rate = RateLimitConfig {
            login_duration_secs: u64::MAX,
            ..RateLimitConfig::default()
        };
        assert!(rate.validate().is_err());

        let rate = RateLimitConfig {
            login_duration_secs: bounds::MAX_DURATION_SECS,
            ..RateLimitConfig::default()
        };
        assert!(rate.validate().is_ok());
    }

    #[test]
    fn test_retention_shorter_than_access_ttl_rejected() {
        let ttl = chrono::Duration::hours(1);
        let lookup = lookup_from(&[(env_vars::KEY_RETENTION_SECS, "1")]);
        let rotation = KeyRotationConfig::from_lookup(&lookup).unwrap();
        assert!(rotation.validate().is_ok());
        assert!(rotation.validate_against(ttl).is_err());

        let lookup = lookup_from(&[(env_vars::KEY_RETENTION_SECS, "3600")]);
        let rotation = KeyRotationConfig::from_lookup(&lookup).unwrap();
        assert!(rotation.validate_against(ttl).is_ok());
        assert!(KeyRotationConfig::default().validate_against(ttl).is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RateLimitConfig {
            login_duration_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
