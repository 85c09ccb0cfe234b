// ABOUTME: Refresh token records, the repository contract and the rotation-on-use lifecycle service
// ABOUTME: Issues opaque random refresh values, redeems them exactly once and revokes or deletes per user
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Refresh Tokens
//!
//! A refresh record is usable iff `now < expiry_date` and it has not been
//! revoked. Redemption revokes the presented record before a replacement is
//! handed back, so replaying an already redeemed value fails with
//! `REFRESH_INVALID`. Two concurrent redemptions of the same value race on
//! [`RefreshTokenRepository::mark_revoked`]; exactly one wins.

use crate::auth::TokenCodec;
use crate::clock::Clock;
use crate::collaborators::UserDirectory;
use crate::constants::crypto::REFRESH_TOKEN_BYTES;
use crate::errors::{AppError, AppResult};
use crate::logging::token_prefix;
use crate::models::{TokenPair, TokenSubject};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Persisted refresh credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Record id
    pub id: Uuid,
    /// Opaque value presented by clients
    pub token: String,
    /// Owning user id
    pub user_id: String,
    /// Instant after which the record is unusable
    pub expiry_date: DateTime<Utc>,
    /// Set once on redemption or revocation
    pub revoked: bool,
    /// Signing key current at issue time
    pub key_id: String,
}

impl RefreshToken {
    /// Whether the record can still be redeemed at `now`
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expiry_date
    }
}

/// Storage contract for refresh records
///
/// Implementations may block on an external store. `mark_revoked` must be
/// atomic per record.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Insert or replace a record
    async fn save(&self, record: &RefreshToken) -> AppResult<()>;

    /// Look up a record by its value
    async fn find_by_token(&self, token: &str) -> AppResult<Option<RefreshToken>>;

    /// All non-revoked records of a user
    async fn find_active_by_user(&self, user_id: &str) -> AppResult<Vec<RefreshToken>>;

    /// Look up a record by value, only if it belongs to `user_id`
    async fn find_by_user_and_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> AppResult<Option<RefreshToken>>;

    /// Set `revoked`; returns `true` only for the call that flipped it
    async fn mark_revoked(&self, token: &str) -> AppResult<bool>;

    /// Remove a record; returns whether it existed
    async fn delete(&self, token: &str) -> AppResult<bool>;

    /// Remove every record of a user; returns how many were removed
    async fn delete_by_user(&self, user_id: &str) -> AppResult<usize>;
}

/// Process-local repository keyed by token value
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenRepository {
    records: DashMap<String, RefreshToken>,
}

impl InMemoryRefreshTokenRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RefreshTokenRepository for InMemoryRefreshTokenRepository {
    async fn save(&self, record: &RefreshToken) -> AppResult<()> {
        self.records.insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Option<RefreshToken>> {
        Ok(self.records.get(token).map(|r| r.value().clone()))
    }

    async fn find_active_by_user(&self, user_id: &str) -> AppResult<Vec<RefreshToken>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.user_id == user_id && !r.revoked)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn find_by_user_and_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> AppResult<Option<RefreshToken>> {
        Ok(self
            .records
            .get(token)
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone()))
    }

    async fn mark_revoked(&self, token: &str) -> AppResult<bool> {
        Ok(self.records.get_mut(token).is_some_and(|mut record| {
            let flipped = !record.revoked;
            record.revoked = true;
            flipped
        }))
    }

    async fn delete(&self, token: &str) -> AppResult<bool> {
        Ok(self.records.remove(token).is_some())
    }

    async fn delete_by_user(&self, user_id: &str) -> AppResult<usize> {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = record.user_id != user_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

/// Refresh token lifecycle: issue, redeem, revoke, delete
#[derive(Clone)]
pub struct RefreshTokenService {
    repository: Arc<dyn RefreshTokenRepository>,
    codec: TokenCodec,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    rng: SystemRandom,
}

impl RefreshTokenService {
    /// Create the service
    #[must_use]
    pub fn new(
        repository: Arc<dyn RefreshTokenRepository>,
        codec: TokenCodec,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            codec,
            users,
            clock,
            access_ttl,
            refresh_ttl,
            rng: SystemRandom::new(),
        }
    }

    /// Backing repository
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn RefreshTokenRepository> {
        &self.repository
    }

    /// Persist a new refresh record for `user_id` and return its value
    ///
    /// # Errors
    ///
    /// Returns `CRYPTO_FAILURE` if random generation fails, `INVALID_INPUT` if
    /// the refresh lifetime is out of range, or a storage error
    pub async fn issue(&self, user_id: &str) -> AppResult<String> {
        let expiry_date = self
            .clock
            .now()
            .checked_add_signed(self.refresh_ttl)
            .ok_or_else(|| AppError::invalid_input("Refresh token lifetime is out of range"))?;
        let record = RefreshToken {
            id: Uuid::new_v4(),
            token: self.generate_value()?,
            user_id: user_id.to_owned(),
            expiry_date,
            revoked: false,
            key_id: self.codec.key_store().current().kid().to_owned(),
        };
        self.repository.save(&record).await?;

        debug!(
            user.id = %user_id,
            token = %token_prefix(&record.token),
            expires = %record.expiry_date,
            "Issued refresh token"
        );
        Ok(record.token)
    }

    /// Exchange a refresh value for a new access token and a new refresh value
    ///
    /// # Errors
    ///
    /// - `REFRESH_NOT_FOUND` if no record matches
    /// - `REFRESH_INVALID` if the record is expired or revoked, or a concurrent
    ///   redemption won; expired or revoked records are deleted
    /// - `USER_NOT_FOUND` if the bound user is gone; the record is revoked
    pub async fn redeem(&self, token: &str) -> AppResult<TokenPair> {
        let Some(record) = self.repository.find_by_token(token).await? else {
            warn!(token = %token_prefix(token), "Refresh token not found");
            return Err(AppError::refresh_not_found());
        };

        if !record.is_usable(self.clock.now()) {
            warn!(
                user.id = %record.user_id,
                revoked = record.revoked,
                "Refresh token expired or revoked, deleting"
            );
            self.repository.delete(token).await?;
            return Err(AppError::refresh_invalid());
        }

        let Some(actor) = self.users.load_by_id(&record.user_id).await? else {
            self.repository.mark_revoked(token).await?;
            warn!(user.id = %record.user_id, "Refresh token bound to a missing user");
            return Err(AppError::user_not_found(record.user_id));
        };

        let access_token = self.codec.issue(actor.identity(), self.access_ttl)?;

        if !self.repository.mark_revoked(token).await? {
            warn!(
                user.id = %record.user_id,
                "Refresh token redeemed concurrently, rejecting replay"
            );
            return Err(AppError::refresh_invalid());
        }

        let refresh_token = self.issue(&record.user_id).await?;
        info!(user.id = %record.user_id, "Rotated refresh token");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Revoke every active record of `user_id`; returns how many were revoked
    ///
    /// # Errors
    ///
    /// Returns a storage error
    pub async fn revoke_all(&self, user_id: &str) -> AppResult<usize> {
        let mut revoked = 0;
        for record in self.repository.find_active_by_user(user_id).await? {
            if self.repository.mark_revoked(&record.token).await? {
                revoked += 1;
            }
        }
        info!(user.id = %user_id, revoked, "Revoked refresh tokens");
        Ok(revoked)
    }

    /// Hard-delete every record of `user_id`; returns how many were deleted
    ///
    /// # Errors
    ///
    /// Returns a storage error
    pub async fn delete_all(&self, user_id: &str) -> AppResult<usize> {
        let deleted = self.repository.delete_by_user(user_id).await?;
        info!(user.id = %user_id, deleted, "Deleted refresh tokens");
        Ok(deleted)
    }

    fn generate_value(&self) -> AppResult<String> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::crypto("System random number generator failed"))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}
