// ABOUTME: Integration tests for per-key login throttling
// ABOUTME: Covers capacity per window, refill after a full window, key isolation and concurrent grants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Duration;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokenward::{clock::ManualClock, config::RateLimitConfig, rate_limiting::RateLimiter};

fn login_limiter() -> (RateLimiter, Arc<ManualClock>) {
    common::init_test_logging();
    let clock = Arc::new(ManualClock::starting_now());
    let limiter = RateLimiter::new(&RateLimitConfig::default(), clock.clone());
    (limiter, clock)
}

#[test]
fn test_five_per_minute_login_scenario() {
    let (limiter, clock) = login_limiter();
    let key = "login_1.2.3.4_a@b.com";

    for attempt in 1..=5 {
        assert!(limiter.try_consume(key), "attempt {attempt} should pass");
    }
    assert!(!limiter.try_consume(key));

    clock.advance(Duration::seconds(60));
    assert!(limiter.try_consume(key));
}

#[test]
fn test_denied_status_carries_retry_hint() {
    let (limiter, clock) = login_limiter();
    let key = RateLimiter::login_key("1.2.3.4", "a@b.com");

    for _ in 0..5 {
        assert!(limiter.check(&key).allowed);
    }
    clock.advance(Duration::seconds(15));

    let status = limiter.check(&key);
    assert!(!status.allowed);
    assert_eq!(status.remaining, 0);
    assert_eq!(status.limit, 5);
    assert_eq!(status.retry_after_secs, 45);
}

#[test]
fn test_keys_are_independent() {
    let (limiter, _) = login_limiter();

    for _ in 0..5 {
        assert!(limiter.try_consume("login_1.2.3.4_a@b.com"));
    }
    assert!(!limiter.try_consume("login_1.2.3.4_a@b.com"));

    assert!(limiter.try_consume("login_5.6.7.8_a@b.com"));
    assert!(limiter.try_consume("login_1.2.3.4_c@d.com"));
    assert_eq!(limiter.available_tokens("login_1.2.3.4_c@d.com"), 4);
}

#[test]
fn test_concurrent_attempts_never_exceed_capacity() {
    let (limiter, _) = login_limiter();
    let granted = AtomicU32::new(0);

    std::thread::scope(|scope| {
        for _ in 0..16 {
            scope.spawn(|| {
                for _ in 0..10 {
                    if limiter.try_consume("login_1.2.3.4_a@b.com") {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(granted.load(Ordering::SeqCst), 5);
    assert_eq!(limiter.available_tokens("login_1.2.3.4_a@b.com"), 0);
}
