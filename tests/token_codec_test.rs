// ABOUTME: Integration tests for access token issuance, verification and key rotation
// ABOUTME: Covers expiry boundaries, kid tagging across rotations, tampering and subject checks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Duration;
use jsonwebtoken::decode_header;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokenward::{auth::JwtValidationError, clock::Clock, errors::ErrorCode, models::Actor};

fn kid_of(token: &str) -> String {
    decode_header(token).unwrap().kid.unwrap()
}

fn replace_char_at(token: &str, index: usize) -> String {
    let mut chars: Vec<char> = token.chars().collect();
    chars[index] = if chars[index] == 'A' { 'B' } else { 'A' };
    chars.into_iter().collect()
}

#[test]
fn test_issue_then_verify_returns_subject() {
    let (codec, _) = common::create_test_codec(Duration::hours(1));

    let token = codec.issue("user@example.com", Duration::hours(1)).unwrap();
    assert_eq!(codec.verify(&token).unwrap(), "user@example.com");

    let short = codec.issue("svc:worker-7", Duration::seconds(1)).unwrap();
    assert_eq!(codec.verify(&short).unwrap(), "svc:worker-7");
}

#[test]
fn test_verify_fails_exactly_at_expiry() {
    let (codec, clock) = common::create_test_codec(Duration::hours(1));
    let token = codec.issue("user@example.com", Duration::seconds(30)).unwrap();

    clock.advance(Duration::seconds(29));
    assert!(codec.verify(&token).is_ok());

    clock.advance(Duration::seconds(1));
    let error = codec.validate_token_detailed(&token).unwrap_err();
    assert!(matches!(error, JwtValidationError::TokenExpired { .. }));

    let error = codec.verify(&token).unwrap_err();
    assert_eq!(error.code, ErrorCode::TokenValidationFailed);
    assert_eq!(error.http_status(), 401);
}

#[test]
fn test_tokens_survive_rotation_until_expiry() {
    let (codec, clock) = common::create_test_codec(Duration::hours(1));
    let before = codec.issue("user@example.com", Duration::minutes(10)).unwrap();
    let old_kid = kid_of(&before);

    let new_kid = codec.key_store().rotate().unwrap();
    let after = codec.issue("user@example.com", Duration::minutes(10)).unwrap();

    assert_ne!(old_kid, new_kid);
    assert_eq!(kid_of(&after), new_kid);
    assert_eq!(codec.verify(&before).unwrap(), "user@example.com");
    assert_eq!(codec.verify(&after).unwrap(), "user@example.com");

    clock.advance(Duration::minutes(10));
    assert!(codec.verify(&before).is_err());
}

#[test]
fn test_pruned_key_fails_signature_via_current_key() {
    let (codec, clock) = common::create_test_codec(Duration::minutes(5));
    let token = codec.issue("user@example.com", Duration::minutes(5)).unwrap();
    let old_kid = kid_of(&token);

    codec.key_store().rotate().unwrap();
    clock.advance(Duration::minutes(6));
    codec.key_store().rotate().unwrap();

    assert!(!codec.key_store().contains(&old_kid));
    let error = codec.validate_token_detailed(&token).unwrap_err();
    assert!(matches!(error, JwtValidationError::TokenInvalid { .. }));
}

#[test]
fn test_ttl_longer_than_retention_survives_pruning() {
    let engine = common::create_test_engine();
    let codec = engine.codec();
    let token = codec.issue("user@example.com", Duration::hours(3)).unwrap();
    let old_kid = kid_of(&token);

    codec.key_store().rotate().unwrap();
    engine.clock.advance(Duration::minutes(70));
    codec.key_store().rotate().unwrap();

    assert!(codec.key_store().contains(&old_kid));
    assert_eq!(codec.verify(&token).unwrap(), "user@example.com");

    engine.clock.advance(Duration::minutes(110));
    codec.key_store().rotate().unwrap();
    assert!(!codec.key_store().contains(&old_kid));
    assert!(codec.verify(&token).is_err());
}

#[test]
fn test_rotation_storm_keeps_every_token_verifiable() {
    let (codec, _) = common::create_test_codec(Duration::hours(1));
    let initial_keys = codec.key_store().len();
    let rotations = AtomicUsize::new(0);
    let verified = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..10 {
                    codec.key_store().rotate().unwrap();
                    rotations.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        for worker in 0..4 {
            let codec = &codec;
            let verified = &verified;
            scope.spawn(move || {
                let subject = format!("worker-{worker}@example.com");
                let mut issued = Vec::new();
                for _ in 0..25 {
                    let token = codec.issue(&subject, Duration::minutes(10)).unwrap();
                    assert_eq!(codec.verify(&token).unwrap(), subject);
                    let _ = codec.key_store().resolve(Some(&kid_of(&token)));
                    let _ = codec.key_store().current();
                    issued.push(token);
                }
                for token in &issued {
                    assert_eq!(codec.verify(token).unwrap(), subject);
                    verified.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(rotations.load(Ordering::SeqCst), 40);
    assert_eq!(verified.load(Ordering::SeqCst), 100);
    assert_eq!(codec.key_store().len(), initial_keys + 40);
}

#[test]
fn test_tampering_any_position_fails() {
    let (codec, _) = common::create_test_codec(Duration::hours(1));
    let token = codec.issue("user@example.com", Duration::hours(1)).unwrap();

    for (index, ch) in token.char_indices() {
        if ch == '.' {
            continue;
        }
        let tampered = replace_char_at(&token, index);
        assert!(
            codec.verify(&tampered).is_err(),
            "tampered token at position {index} still verified"
        );
    }
}

#[test]
fn test_last_character_mutation_scenario() {
    let (codec, _) = common::create_test_codec(Duration::hours(1));
    let token = codec.issue("user@example.com", Duration::hours(1)).unwrap();

    assert_eq!(codec.verify(&token).unwrap(), "user@example.com");

    let tampered = replace_char_at(&token, token.len() - 1);
    let error = codec.verify(&tampered).unwrap_err();
    assert!(error.is_unauthenticated());
}

#[test]
fn test_garbage_tokens_are_validation_failures() {
    let (codec, _) = common::create_test_codec(Duration::hours(1));

    for garbage in ["", "abc", "a.b.c", "Bearer xyz"] {
        let error = codec.verify(garbage).unwrap_err();
        assert_eq!(error.code, ErrorCode::TokenValidationFailed);
    }
}

#[test]
fn test_validate_for_requires_matching_actor() {
    let (codec, _) = common::create_test_codec(Duration::hours(1));
    let owner = Actor::new("u-1", "owner@example.com");
    let other = Actor::new("u-2", "other@example.com");
    let token = codec.issue("owner@example.com", Duration::hours(1)).unwrap();

    let claims = codec.validate_for(&token, &owner).unwrap();
    assert_eq!(claims.sub, "owner@example.com");

    let error = codec.validate_for(&token, &other).unwrap_err();
    assert_eq!(error.code, ErrorCode::TokenValidationFailed);
    assert!(codec.validate_for(&token, "owner@example.com").is_ok());
}

#[test]
fn test_decode_claims_reports_expiry() {
    let (codec, clock) = common::create_test_codec(Duration::hours(1));
    let issued_at = clock.now();
    let token = codec.issue("user@example.com", Duration::hours(1)).unwrap();

    let claims = codec.decode_claims(&token).unwrap();
    assert_eq!(claims.issued_at(), Some(issued_at));
    assert_eq!(claims.expires_at(), Some(issued_at + Duration::hours(1)));
}
