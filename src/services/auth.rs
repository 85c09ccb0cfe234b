// ABOUTME: Auth orchestration for login, registration and refresh on top of the token engine
// ABOUTME: Gates login through the rate limiter, delegates credential checks and issues token pairs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Auth Service
//!
//! Login flow: rate limiter gate, external credential check, then an access
//! token (subject = account identity) and a fresh refresh token. Registration
//! skips the rate limiter. Refresh delegates to
//! [`RefreshTokenService::redeem`].

use crate::auth::{Claims, TokenCodec};
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{CredentialVerifier, UserDirectory, UserRegistrar};
use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::key_rotation::{self, KeyRotationHandle};
use crate::logging::AuthLogger;
use crate::models::{Actor, AuthResponse, Credentials, Registration, TokenPair, TokenSubject};
use crate::rate_limiting::RateLimiter;
use crate::refresh_tokens::{RefreshTokenRepository, RefreshTokenService};
use crate::signing_keys::SigningKeyStore;
use chrono::Duration;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// External capabilities the auth flows depend on
#[derive(Clone)]
pub struct AuthCollaborators {
    /// Checks login secrets
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Resolves actors by identity or id
    pub users: Arc<dyn UserDirectory>,
    /// Creates accounts
    pub registrar: Arc<dyn UserRegistrar>,
}

/// Login, registration and refresh flows plus the token contracts exposed to the API layer
#[derive(Clone)]
pub struct AuthService {
    codec: TokenCodec,
    refresh_tokens: RefreshTokenService,
    rate_limiter: Arc<RateLimiter>,
    collaborators: AuthCollaborators,
    access_ttl: Duration,
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("codec", &self.codec)
            .field("access_ttl", &self.access_ttl)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Assemble the service from already constructed parts
    #[must_use]
    pub fn new(
        codec: TokenCodec,
        refresh_tokens: RefreshTokenService,
        rate_limiter: Arc<RateLimiter>,
        collaborators: AuthCollaborators,
        access_ttl: Duration,
    ) -> Self {
        Self {
            codec,
            refresh_tokens,
            rate_limiter,
            collaborators,
            access_ttl,
        }
    }

    /// Wire the full engine from configuration using the system clock
    ///
    /// Returns the rotation handle when rotation is enabled; dropping it stops
    /// scheduled rotation. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` for invalid configuration, `CRYPTO_FAILURE` if the
    /// first key cannot be generated, or `INTERNAL_ERROR` outside a Tokio runtime
    pub fn bootstrap(
        config: &ServerConfig,
        collaborators: AuthCollaborators,
        repository: Arc<dyn RefreshTokenRepository>,
    ) -> AppResult<(Self, Option<KeyRotationHandle>)> {
        Self::bootstrap_with_clock(config, collaborators, repository, Arc::new(SystemClock))
    }

    /// Wire the full engine with an explicit clock
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::bootstrap`]
    pub fn bootstrap_with_clock(
        config: &ServerConfig,
        collaborators: AuthCollaborators,
        repository: Arc<dyn RefreshTokenRepository>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<(Self, Option<KeyRotationHandle>)> {
        config.validate()?;

        let access_ttl = config.auth.access_token_ttl();
        let keys = Arc::new(SigningKeyStore::bootstrap(
            config.auth.secret_seed.as_ref().map(|seed| seed.as_str()),
            Arc::clone(&clock),
            config.key_rotation.retention(access_ttl),
        )?);

        let rotation = if config.key_rotation.enabled {
            tokio::runtime::Handle::try_current().map_err(|e| {
                AppError::internal(format!("Key rotation requires a Tokio runtime: {e}"))
            })?;
            Some(key_rotation::start_scheduler(
                Arc::clone(&keys),
                config.key_rotation.interval(),
            ))
        } else {
            info!("Signing key rotation scheduler disabled");
            None
        };

        let codec = TokenCodec::new(keys, Arc::clone(&clock));
        let refresh_tokens = RefreshTokenService::new(
            repository,
            codec.clone(),
            Arc::clone(&collaborators.users),
            Arc::clone(&clock),
            access_ttl,
            config.auth.refresh_token_ttl(),
        );
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit, clock));

        info!("Auth service ready: {}", config.summary());
        Ok((
            Self::new(codec, refresh_tokens, rate_limiter, collaborators, access_ttl),
            rotation,
        ))
    }

    /// Authenticate and issue a token pair
    ///
    /// # Errors
    ///
    /// - `RATE_LIMIT_EXCEEDED` when the `(client, account)` bucket is empty
    /// - the verifier's error unchanged (normally `BAD_CREDENTIALS`)
    /// - `USER_NOT_FOUND` if the directory has no actor for the account
    pub async fn login(&self, client_id: &str, credentials: &Credentials) -> AppResult<AuthResponse> {
        let account_id = credentials.account_id.as_str();
        let key = RateLimiter::login_key(client_id, account_id);

        let status = self.rate_limiter.check(&key);
        if !status.allowed {
            AuthLogger::log_security_event(
                "login_rate_limited",
                &format!("Rate limit exceeded for key {key}"),
                Some(account_id),
            );
            return Err(AppError::rate_limit_exceeded(&key, status.retry_after_secs));
        }

        if let Err(e) = self
            .collaborators
            .verifier
            .verify(account_id, &credentials.secret)
            .await
        {
            AuthLogger::log_auth_event(account_id, "login", false, Some(&e.message));
            return Err(e);
        }

        let actor = self
            .collaborators
            .users
            .load_by_identity(account_id)
            .await?
            .ok_or_else(|| AppError::user_not_found(account_id))?;

        let response = self.issue_pair(&actor).await?;
        AuthLogger::log_auth_event(account_id, "login", true, None);
        Ok(response)
    }

    /// Create an account and issue its first token pair; not rate limited
    ///
    /// # Errors
    ///
    /// Returns the registrar's error unchanged or a token issuance error
    pub async fn register(&self, registration: &Registration) -> AppResult<AuthResponse> {
        let actor = self.collaborators.registrar.register(registration).await?;
        let response = self.issue_pair(&actor).await?;
        AuthLogger::log_auth_event(actor.identity(), "register", true, None);
        Ok(response)
    }

    /// Redeem a refresh token for a new pair
    ///
    /// # Errors
    ///
    /// Returns `REFRESH_NOT_FOUND`, `REFRESH_INVALID` or `USER_NOT_FOUND`
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<AuthResponse> {
        let pair = self.redeem_refresh_token(refresh_token).await?;
        Ok(AuthResponse::bearer(pair, self.expires_in()))
    }

    /// Sign an access token for `actor`
    ///
    /// # Errors
    ///
    /// Returns `CRYPTO_FAILURE` if signing fails
    pub fn issue_access_token(&self, actor: &(impl TokenSubject + ?Sized)) -> AppResult<String> {
        self.codec.issue(actor.identity(), self.access_ttl)
    }

    /// Persist a refresh token for `actor`
    ///
    /// # Errors
    ///
    /// Returns a storage or random generation error
    pub async fn issue_refresh_token(&self, actor: &Actor) -> AppResult<String> {
        self.refresh_tokens.issue(&actor.id).await
    }

    /// Rotate a refresh token
    ///
    /// # Errors
    ///
    /// Returns `REFRESH_NOT_FOUND`, `REFRESH_INVALID` or `USER_NOT_FOUND`
    pub async fn redeem_refresh_token(&self, refresh_token: &str) -> AppResult<TokenPair> {
        self.refresh_tokens.redeem(refresh_token).await
    }

    /// Revoke every refresh token of a user (logout everywhere)
    ///
    /// # Errors
    ///
    /// Returns a storage error
    pub async fn revoke_all_for_user(&self, user_id: &str) -> AppResult<usize> {
        self.refresh_tokens.revoke_all(user_id).await
    }

    /// Delete every refresh token of a user (account deletion)
    ///
    /// # Errors
    ///
    /// Returns a storage error
    pub async fn delete_all_for_user(&self, user_id: &str) -> AppResult<usize> {
        self.refresh_tokens.delete_all(user_id).await
    }

    /// Consume one login attempt for `(client_id, account_id)`
    #[must_use]
    pub fn try_consume_login_attempt(&self, client_id: &str, account_id: &str) -> bool {
        self.rate_limiter
            .try_consume(&RateLimiter::login_key(client_id, account_id))
    }

    /// Verify an access token and return its subject
    ///
    /// # Errors
    ///
    /// Returns `TOKEN_VALIDATION_FAILED`
    pub fn verify_access_token(&self, token: &str) -> AppResult<String> {
        self.codec.verify(token)
    }

    /// Verify an access token and require it to belong to `actor`
    ///
    /// # Errors
    ///
    /// Returns `TOKEN_VALIDATION_FAILED`
    pub fn validate_for(
        &self,
        token: &str,
        actor: &(impl TokenSubject + ?Sized),
    ) -> AppResult<Claims> {
        self.codec.validate_for(token, actor)
    }

    /// Token codec
    #[must_use]
    pub const fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Login rate limiter
    #[must_use]
    pub const fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Refresh token lifecycle
    #[must_use]
    pub const fn refresh_tokens(&self) -> &RefreshTokenService {
        &self.refresh_tokens
    }

    /// Access token lifetime in whole seconds
    #[must_use]
    pub fn expires_in(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    async fn issue_pair(&self, actor: &Actor) -> AppResult<AuthResponse> {
        let pair = TokenPair {
            access_token: self.issue_access_token(actor)?,
            refresh_token: self.issue_refresh_token(actor).await?,
        };
        Ok(AuthResponse::bearer(pair, self.expires_in()))
    }
}
