// ABOUTME: Signing key store holding the current HMAC-SHA512 key and retired keys kept for verification
// ABOUTME: Rotation generates a fresh 512-bit secret, swaps the current pointer and prunes expired retirees
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Signing Key Management
//!
//! Every access token carries the `kid` of the key that signed it, so tokens
//! issued before a rotation keep verifying until their own expiry:
//! - New signatures always use the current key
//! - Retired keys remain resolvable until `retention` has elapsed since
//!   retirement and every token signed with them has expired
//! - An absent or unknown `kid` resolves to the current key
//!
//! Rotation is serialized by a mutex; lookups only take a read lock long
//! enough to clone an `Arc`.

use crate::clock::Clock;
use crate::constants::crypto::JWT_SECRET_LENGTH;
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{DecodingKey, EncodingKey};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

/// An immutable HMAC signing key
pub struct SigningKey {
    kid: String,
    secret: Zeroizing<Vec<u8>>,
    created_at: DateTime<Utc>,
}

impl SigningKey {
    fn new(secret: Zeroizing<Vec<u8>>, created_at: DateTime<Utc>) -> Self {
        Self {
            kid: Uuid::new_v4().to_string(),
            secret,
            created_at,
        }
    }

    /// Key identifier placed in the token header
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// When the key was created
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Raw secret length in bytes
    #[must_use]
    pub fn secret_len(&self) -> usize {
        self.secret.len()
    }

    pub(crate) fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(&self.secret)
    }

    pub(crate) fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(&self.secret)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("secret", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Thread-safe set of signing keys with exactly one current key
pub struct SigningKeyStore {
    keys: DashMap<String, Arc<SigningKey>>,
    /// kid -> instant it stopped being current
    retired_at: DashMap<String, DateTime<Utc>>,
    /// kid -> latest `exp` signed with it
    latest_expiry: DashMap<String, DateTime<Utc>>,
    current: RwLock<Arc<SigningKey>>,
    rotation_lock: Mutex<()>,
    rng: SystemRandom,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl SigningKeyStore {
    /// Create a store whose first key is random
    ///
    /// # Errors
    ///
    /// Returns `CRYPTO_FAILURE` if the system RNG fails
    pub fn new(clock: Arc<dyn Clock>, retention: Duration) -> AppResult<Self> {
        let rng = SystemRandom::new();
        let secret = generate_secret(&rng)?;
        Ok(Self::with_first_secret(secret, rng, clock, retention))
    }

    /// Create a store whose first key is derived from a configured seed
    ///
    /// The seed only covers the period before the first rotation.
    #[must_use]
    pub fn from_seed(seed: &str, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        let derived = digest::digest(&digest::SHA512, seed.as_bytes());
        let secret = Zeroizing::new(derived.as_ref().to_vec());
        Self::with_first_secret(secret, SystemRandom::new(), clock, retention)
    }

    /// Seeded store when a seed is configured, random otherwise
    ///
    /// # Errors
    ///
    /// Returns `CRYPTO_FAILURE` if the system RNG fails
    pub fn bootstrap(
        seed: Option<&str>,
        clock: Arc<dyn Clock>,
        retention: Duration,
    ) -> AppResult<Self> {
        let store = match seed {
            Some(seed) => Self::from_seed(seed, clock, retention),
            None => Self::new(clock, retention)?,
        };
        info!(
            kid = %store.current().kid(),
            seeded = seed.is_some(),
            "Signing key store initialized"
        );
        Ok(store)
    }

    fn with_first_secret(
        secret: Zeroizing<Vec<u8>>,
        rng: SystemRandom,
        clock: Arc<dyn Clock>,
        retention: Duration,
    ) -> Self {
        let first = Arc::new(SigningKey::new(secret, clock.now()));
        let keys = DashMap::new();
        keys.insert(first.kid.clone(), Arc::clone(&first));

        Self {
            keys,
            retired_at: DashMap::new(),
            latest_expiry: DashMap::new(),
            current: RwLock::new(first),
            rotation_lock: Mutex::new(()),
            rng,
            clock,
            retention,
        }
    }

    /// Generate a new key, make it current and prune expired retirees
    ///
    /// # Errors
    ///
    /// Returns `CRYPTO_FAILURE` if the system RNG fails; the store is left unchanged
    pub fn rotate(&self) -> AppResult<String> {
        let _guard = self
            .rotation_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let secret = generate_secret(&self.rng).inspect_err(|e| {
            error!("Signing key rotation failed: {e}");
        })?;
        let now = self.clock.now();
        let key = Arc::new(SigningKey::new(secret, now));
        let kid = key.kid.clone();

        // Insert before swapping so a freshly signed token always resolves
        self.keys.insert(kid.clone(), Arc::clone(&key));
        let previous = {
            let mut current = self.write_current();
            std::mem::replace(&mut *current, key)
        };
        self.retired_at.insert(previous.kid.clone(), now);

        let pruned = self.prune_retired(now);
        info!(
            kid = %kid,
            previous_kid = %previous.kid,
            retained = self.keys.len(),
            pruned,
            "Rotated signing key"
        );
        Ok(kid)
    }

    /// Current key used for new signatures
    #[must_use]
    pub fn current(&self) -> Arc<SigningKey> {
        Arc::clone(
            &self
                .current
                .read()
                .unwrap_or_else(|poisoned| {
                    warn!("Signing key lock poisoned, recovering");
                    poisoned.into_inner()
                }),
        )
    }

    /// Key matching `kid`, or the current key when `kid` is absent or unknown
    #[must_use]
    pub fn resolve(&self, kid: Option<&str>) -> Arc<SigningKey> {
        if let Some(kid) = kid {
            if let Some(key) = self.keys.get(kid) {
                return Arc::clone(key.value());
            }
            debug!(kid = %kid, "Unknown signing key id, falling back to current key");
        }
        self.current()
    }

    /// Whether `kid` is still retained
    #[must_use]
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// Number of retained keys, current included
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; a store holds at least its current key
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Note that a token expiring at `exp` was signed with `kid`
    ///
    /// A retired key is never pruned before its latest recorded expiry.
    pub fn record_expiry(&self, kid: &str, exp: DateTime<Utc>) {
        self.latest_expiry
            .entry(kid.to_owned())
            .and_modify(|latest| {
                if exp > *latest {
                    *latest = exp;
                }
            })
            .or_insert(exp);
    }

    /// How long retired keys remain resolvable
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    fn write_current(&self) -> std::sync::RwLockWriteGuard<'_, Arc<SigningKey>> {
        self.current.write().unwrap_or_else(|poisoned| {
            warn!("Signing key lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Drop retirees past retention whose tokens have all expired. Expiry is
    /// rounded up to whole seconds at issue time, hence the extra second.
    fn prune_retired(&self, now: DateTime<Utc>) -> usize {
        let Some(horizon) = self.retention.checked_add(&Duration::seconds(1)) else {
            return 0;
        };
        let expired: Vec<String> = self
            .retired_at
            .iter()
            .filter(|entry| now - *entry.value() > horizon)
            .filter(|entry| {
                self.latest_expiry
                    .get(entry.key())
                    .is_none_or(|latest| now >= *latest)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for kid in &expired {
            self.retired_at.remove(kid);
            self.latest_expiry.remove(kid);
            self.keys.remove(kid);
            debug!(kid = %kid, "Pruned retired signing key");
        }
        expired.len()
    }
}

impl fmt::Debug for SigningKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyStore")
            .field("current", &self.current().kid())
            .field("retained", &self.keys.len())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

fn generate_secret(rng: &SystemRandom) -> AppResult<Zeroizing<Vec<u8>>> {
    let mut secret = Zeroizing::new(vec![0u8; JWT_SECRET_LENGTH]);
    rng.fill(&mut secret)
        .map_err(|_| AppError::crypto("System random number generator failed"))?;
    Ok(secret)
}
