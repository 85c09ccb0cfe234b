// ABOUTME: Crate-wide constants and configuration defaults for the token lifecycle engine
// ABOUTME: Holds environment variable names, TTL defaults, rate-limit defaults and crypto sizes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Constants Module
//!
//! Hardcoded defaults for every configurable option plus the environment
//! variable names they are read from.

/// Service identity used in structured logs
pub mod service_names {
    /// Default service name
    pub const TOKENWARD: &str = "tokenward";
}

/// Environment variable names
pub mod env_vars {
    /// Seed for the first signing key
    pub const JWT_SECRET_SEED: &str = "JWT_SECRET_SEED";
    /// Access token lifetime in milliseconds
    pub const JWT_ACCESS_TOKEN_EXPIRATION: &str = "JWT_ACCESS_TOKEN_EXPIRATION";
    /// Refresh token lifetime in milliseconds
    pub const JWT_REFRESH_TOKEN_EXPIRATION: &str = "JWT_REFRESH_TOKEN_EXPIRATION";
    /// Login attempts per window
    pub const RATE_LIMIT_LOGIN_ATTEMPTS: &str = "APP_SECURITY_RATE_LIMIT_LOGIN_ATTEMPTS";
    /// Login window in seconds
    pub const RATE_LIMIT_LOGIN_DURATION: &str = "APP_SECURITY_RATE_LIMIT_LOGIN_DURATION";
    /// Bucket count that triggers idle eviction
    pub const RATE_LIMIT_CLEANUP_THRESHOLD: &str = "RATE_LIMIT_CLEANUP_THRESHOLD";
    /// Seconds between scheduled rotations
    pub const KEY_ROTATION_INTERVAL_SECS: &str = "JWT_KEY_ROTATION_INTERVAL_SECS";
    /// Toggle for the rotation scheduler
    pub const KEY_ROTATION_ENABLED: &str = "JWT_KEY_ROTATION_ENABLED";
    /// Seconds a retired key stays resolvable
    pub const KEY_RETENTION_SECS: &str = "JWT_KEY_RETENTION_SECS";
}

/// Token lifetimes
pub mod tokens {
    /// Access token lifetime in milliseconds (1 hour)
    pub const DEFAULT_ACCESS_TOKEN_EXPIRATION_MS: u64 = 3_600_000;
    /// Refresh token lifetime in milliseconds (24 hours)
    pub const DEFAULT_REFRESH_TOKEN_EXPIRATION_MS: u64 = 86_400_000;
    /// Token type reported to clients
    pub const TOKEN_TYPE_BEARER: &str = "Bearer";
}

/// Login throttling defaults
pub mod limits {
    /// Login attempts allowed per window
    pub const DEFAULT_LOGIN_ATTEMPTS: u32 = 5;
    /// Window length in seconds
    pub const DEFAULT_LOGIN_DURATION_SECS: u64 = 60;
    /// Bucket-map size that triggers eviction of idle buckets
    pub const DEFAULT_RATE_LIMIT_CLEANUP_THRESHOLD: usize = 10_000;
    /// Prefix of every login rate-limit key
    pub const LOGIN_KEY_PREFIX: &str = "login_";
}

/// Signing key rotation defaults
pub mod rotation {
    /// Rotate once a day
    pub const DEFAULT_KEY_ROTATION_INTERVAL_SECS: u64 = 86_400;
}

/// Upper bounds on configured durations
pub mod bounds {
    /// Longest accepted lifetime, window, interval or retention (100 years)
    pub const MAX_DURATION_SECS: u64 = 100 * 365 * 86_400;
    /// Same bound in milliseconds
    pub const MAX_DURATION_MS: u64 = MAX_DURATION_SECS * 1_000;
}

/// Cryptographic sizes
pub mod crypto {
    /// HMAC-SHA512 secret length in bytes (512 bits)
    pub const JWT_SECRET_LENGTH: usize = 64;
    /// Minimum accepted length of a configured secret seed
    pub const MIN_SECRET_SEED_LENGTH: usize = 32;
    /// Random bytes per refresh token value (256 bits)
    pub const REFRESH_TOKEN_BYTES: usize = 32;
}
