// ABOUTME: Shared test utilities and in-memory collaborators for integration tests
// ABOUTME: Provides quiet logging, a credential verifier, a user directory and engine wiring helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used
)]
//! Shared test utilities for `tokenward`

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use std::sync::{Arc, Once};
use tokenward::{
    auth::TokenCodec,
    clock::{Clock, ManualClock},
    collaborators::{CredentialVerifier, UserDirectory, UserRegistrar},
    config::ServerConfig,
    errors::{AppError, AppResult},
    models::{Actor, Registration},
    refresh_tokens::{InMemoryRefreshTokenRepository, RefreshTokenService},
    services::{AuthCollaborators, AuthService},
    signing_keys::SigningKeyStore,
};
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Accounts and secrets known to the test verifier and directory
#[derive(Default)]
pub struct InMemoryUsers {
    /// user id -> actor
    actors: DashMap<String, Actor>,
    /// username -> secret
    secrets: DashMap<String, String>,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account and return its actor
    pub fn add(&self, username: &str, secret: &str) -> Actor {
        let actor = Actor::new(Uuid::new_v4().to_string(), username);
        self.actors.insert(actor.id.clone(), actor.clone());
        self.secrets.insert(username.to_owned(), secret.to_owned());
        actor
    }

    /// Remove an account entirely
    pub fn remove(&self, user_id: &str) {
        if let Some((_, actor)) = self.actors.remove(user_id) {
            self.secrets.remove(&actor.username);
        }
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryUsers {
    async fn verify(&self, account_id: &str, secret: &str) -> AppResult<()> {
        match self.secrets.get(account_id) {
            Some(expected) if expected.value() == secret => Ok(()),
            _ => Err(AppError::bad_credentials(account_id)),
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUsers {
    async fn load_by_identity(&self, identity: &str) -> AppResult<Option<Actor>> {
        Ok(self
            .actors
            .iter()
            .find(|entry| entry.username == identity)
            .map(|entry| entry.value().clone()))
    }

    async fn load_by_id(&self, user_id: &str) -> AppResult<Option<Actor>> {
        Ok(self.actors.get(user_id).map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl UserRegistrar for InMemoryUsers {
    async fn register(&self, registration: &Registration) -> AppResult<Actor> {
        if self.secrets.contains_key(&registration.email) {
            return Err(AppError::user_already_exists(&registration.email));
        }
        Ok(self.add(&registration.email, &registration.secret))
    }
}

/// Fully wired engine driven by a manual clock
pub struct TestEngine {
    pub clock: Arc<ManualClock>,
    pub users: Arc<InMemoryUsers>,
    pub repository: Arc<InMemoryRefreshTokenRepository>,
    pub auth: AuthService,
}

impl TestEngine {
    pub fn codec(&self) -> &TokenCodec {
        self.auth.codec()
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenService {
        self.auth.refresh_tokens()
    }
}

/// Default configuration with the rotation scheduler disabled
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.key_rotation.enabled = false;
    config
}

/// Engine over `config` with a fresh manual clock
pub fn create_test_engine_with(config: &ServerConfig) -> TestEngine {
    init_test_logging();
    let clock = Arc::new(ManualClock::starting_now());
    let users = Arc::new(InMemoryUsers::new());
    let repository = Arc::new(InMemoryRefreshTokenRepository::new());
    let collaborators = AuthCollaborators {
        verifier: users.clone(),
        users: users.clone(),
        registrar: users.clone(),
    };

    let (auth, rotation) =
        AuthService::bootstrap_with_clock(config, collaborators, repository.clone(), clock.clone())
            .unwrap();
    assert!(rotation.is_none());

    TestEngine {
        clock,
        users,
        repository,
        auth,
    }
}

/// Engine with default limits and no scheduler
pub fn create_test_engine() -> TestEngine {
    create_test_engine_with(&test_config())
}

/// Key store and codec sharing a manual clock
pub fn create_test_codec(retention: Duration) -> (TokenCodec, Arc<ManualClock>) {
    init_test_logging();
    let clock = Arc::new(ManualClock::starting_now());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let keys = Arc::new(SigningKeyStore::new(dyn_clock.clone(), retention).unwrap());
    (TokenCodec::new(keys, dyn_clock), clock)
}
