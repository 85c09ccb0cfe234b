// ABOUTME: Per-key token bucket throttling for login attempts keyed by client and account
// ABOUTME: Buckets refill fully once per window and live in a sharded map with lazy idle eviction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Login Rate Limiting
//!
//! Each `"login_" + client + "_" + account` key owns a bucket holding up to
//! `capacity` tokens. A bucket refills to capacity at every whole window
//! boundary since its last refill. Refill and consumption for one key happen
//! under that key's `DashMap` entry lock, so concurrent attempts on the same
//! key never receive more than `capacity` grants per window.
//!
//! Once the map exceeds the cleanup threshold, idle buckets are swept at most
//! once per window.
//!
//! This is advisory throttling: it raises the cost of brute force but does not
//! stop distributed attempts coming from many client identifiers.

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::constants::limits::LOGIN_KEY_PREFIX;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    available: u32,
    last_refill: DateTime<Utc>,
}

impl Bucket {
    const fn full(capacity: u32, now: DateTime<Utc>) -> Self {
        Self {
            available: capacity,
            last_refill: now,
        }
    }

    /// Refill at whole-window boundaries, keeping `last_refill` aligned to them
    fn refill(&mut self, capacity: u32, window: Duration, now: DateTime<Utc>) {
        let elapsed = now - self.last_refill;
        if elapsed < window {
            return;
        }
        let window_ms = window.num_milliseconds().max(1);
        let periods = elapsed.num_milliseconds() / window_ms;
        self.available = capacity;
        self.last_refill += Duration::milliseconds(periods.saturating_mul(window_ms));
    }

    fn next_refill(&self, window: Duration) -> DateTime<Utc> {
        self.last_refill
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Whether a token was consumed
    pub allowed: bool,
    /// Bucket capacity
    pub limit: u32,
    /// Tokens left after this check
    pub remaining: u32,
    /// Next full refill
    pub reset_at: DateTime<Utc>,
    /// Seconds until a retry can succeed; zero when allowed
    pub retry_after_secs: u64,
}

/// Token-bucket limiter with one bucket per key
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    capacity: u32,
    window: Duration,
    cleanup_threshold: usize,
    /// Millisecond timestamp of the last idle sweep
    last_sweep_ms: AtomicI64,
    sweeps: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter from configuration
    #[must_use]
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_limits(
            config.login_attempts,
            config.window(),
            config.cleanup_threshold,
            clock,
        )
    }

    /// Create a limiter with explicit limits
    #[must_use]
    pub fn with_limits(
        capacity: u32,
        window: Duration,
        cleanup_threshold: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            window,
            cleanup_threshold,
            last_sweep_ms: AtomicI64::new(i64::MIN),
            sweeps: AtomicU64::new(0),
            clock,
        }
    }

    /// Bucket key for a login attempt
    #[must_use]
    pub fn login_key(client_id: &str, account_id: &str) -> String {
        format!("{LOGIN_KEY_PREFIX}{client_id}_{account_id}")
    }

    /// Try to take one token from `key`'s bucket, creating it if absent
    #[must_use]
    pub fn check(&self, key: &str) -> RateLimitStatus {
        let now = self.clock.now();

        let mut entry = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| Bucket::full(self.capacity, now));
        let bucket = entry.value_mut();
        bucket.refill(self.capacity, self.window, now);

        let allowed = bucket.available > 0;
        if allowed {
            bucket.available -= 1;
        }
        let remaining = bucket.available;
        let reset_at = bucket.next_refill(self.window);
        drop(entry);

        if self.buckets.len() > self.cleanup_threshold {
            self.maybe_cleanup_idle_buckets(now);
        }

        let retry_after_secs = if allowed {
            0
        } else {
            let wait = (reset_at - now).num_milliseconds().max(0);
            u64::try_from((wait + 999) / 1000).unwrap_or(0).max(1)
        };

        if !allowed {
            debug!(key = %key, retry_after_secs, "Rate limit bucket empty");
        }

        RateLimitStatus {
            allowed,
            limit: self.capacity,
            remaining,
            reset_at,
            retry_after_secs,
        }
    }

    /// Take one token from `key`'s bucket; `false` when none is available
    #[must_use]
    pub fn try_consume(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Tokens currently available for `key` without consuming any
    #[must_use]
    pub fn available_tokens(&self, key: &str) -> u32 {
        let now = self.clock.now();
        self.buckets.get(key).map_or(self.capacity, |bucket| {
            let mut snapshot = *bucket.value();
            snapshot.refill(self.capacity, self.window, now);
            snapshot.available
        })
    }

    /// Number of buckets currently held
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Number of idle sweeps performed so far
    #[must_use]
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Sweep at most once per window; the caller that wins the swap sweeps
    fn maybe_cleanup_idle_buckets(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) < self.window.num_milliseconds() {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.cleanup_idle_buckets(now);
        }
    }

    /// A bucket a full window past its last refill would be refilled to
    /// capacity, which is the same as having no bucket at all.
    fn cleanup_idle_buckets(&self, now: DateTime<Utc>) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now - bucket.last_refill < self.window);
        debug!(
            evicted = before.saturating_sub(self.buckets.len()),
            "Evicted idle rate limit buckets"
        );
    }
}

/// Client identifier from `X-Forwarded-For`, falling back to the peer address
#[must_use]
pub fn client_id_from_forwarded(x_forwarded_for: Option<&str>, remote_addr: &str) -> String {
    x_forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .unwrap_or(remote_addr)
        .to_owned()
}
