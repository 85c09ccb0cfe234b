// ABOUTME: Access token codec issuing and verifying HS512 JWTs tagged with the signing key id
// ABOUTME: Resolves verification keys through the signing key store and reports detailed validation errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Access Tokens
//!
//! Tokens are compact JWTs: a header carrying `alg` and `kid`, a claims
//! payload with `sub`, `iat` and `exp`, and an HMAC-SHA512 signature.
//! Verification resolves the key named by `kid` (falling back to the current
//! key), checks the signature in constant time, then rejects the token once
//! `now >= exp`.

use crate::clock::Clock;
use crate::errors::{AppError, AppResult};
use crate::logging::token_prefix;
use crate::models::TokenSubject;
use crate::signing_keys::SigningKeyStore;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Signature algorithm for every access token
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS512;

/// `JWT` validation error with detailed information
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token has expired
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
        /// Current time for reference
        current_time: DateTime<Utc>,
    },
    /// Token signature is invalid
    TokenInvalid {
        /// Reason for invalidity
        reason: String,
    },
    /// Token is malformed (not proper `JWT` format)
    TokenMalformed {
        /// Details about malformation
        details: String,
    },
}

impl fmt::Display for JwtValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenExpired {
                expired_at,
                current_time,
            } => write!(
                f,
                "JWT token expired {} seconds ago at {}",
                current_time.signed_duration_since(*expired_at).num_seconds(),
                expired_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            Self::TokenInvalid { reason } => write!(f, "JWT token is invalid: {reason}"),
            Self::TokenMalformed { details } => write!(f, "JWT token is malformed: {details}"),
        }
    }
}

impl std::error::Error for JwtValidationError {}

impl JwtValidationError {
    /// Short machine-readable reason
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::TokenExpired { .. } => "expired",
            Self::TokenInvalid { .. } => "invalid",
            Self::TokenMalformed { .. } => "malformed",
        }
    }
}

impl From<JwtValidationError> for AppError {
    fn from(error: JwtValidationError) -> Self {
        Self::token_validation(error.to_string()).with_details(serde_json::json!({
            "reason": error.reason_code(),
        }))
    }
}

/// `JWT` claims for access tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Actor identity
    pub sub: String,
    /// Issued at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
}

impl Claims {
    /// Expiry as a timestamp
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Issue time as a timestamp
    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }
}

/// Issues and verifies access tokens
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<SigningKeyStore>,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Create a codec over a shared key store
    #[must_use]
    pub fn new(keys: Arc<SigningKeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { keys, clock }
    }

    /// Key store backing this codec
    #[must_use]
    pub const fn key_store(&self) -> &Arc<SigningKeyStore> {
        &self.keys
    }

    /// Issue a token for `subject` valid for `ttl`
    ///
    /// `exp` is rounded up to the next whole second so a positive `ttl`
    /// never yields a token that is already expired. The signing key is kept
    /// resolvable at least until `exp`.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` for a non-positive or unrepresentable `ttl` and
    /// `CRYPTO_FAILURE` if signing fails
    pub fn issue(&self, subject: &str, ttl: Duration) -> AppResult<String> {
        if ttl <= Duration::zero() {
            return Err(AppError::invalid_input(
                "Access token lifetime must be positive",
            ));
        }

        let key = self.keys.current();
        let now = self.clock.now();
        let expires = now
            .checked_add_signed(ttl)
            .and_then(|expires| {
                let exp = expires.timestamp() + i64::from(expires.timestamp_subsec_nanos() > 0);
                DateTime::from_timestamp(exp, 0)
            })
            .ok_or_else(|| AppError::invalid_input("Access token lifetime is out of range"))?;
        let exp = expires.timestamp();
        self.keys.record_expiry(key.kid(), expires);

        let claims = Claims {
            sub: subject.to_owned(),
            iat: now.timestamp(),
            exp,
        };

        let mut header = Header::new(TOKEN_ALGORITHM);
        header.kid = Some(key.kid().to_owned());

        let token = encode(&header, &claims, &key.encoding_key())
            .map_err(|e| AppError::crypto(format!("Failed to sign access token: {e}")))?;

        debug!(kid = %key.kid(), sub = %subject, exp, "Issued access token");
        Ok(token)
    }

    /// Verify `token` and return its subject
    ///
    /// # Errors
    ///
    /// Returns `TOKEN_VALIDATION_FAILED` for any parse, signature or expiry problem
    pub fn verify(&self, token: &str) -> AppResult<String> {
        self.validate_token_detailed(token)
            .map(|claims| claims.sub)
            .map_err(AppError::from)
    }

    /// Verified claims of `token`
    ///
    /// # Errors
    ///
    /// Returns `TOKEN_VALIDATION_FAILED` for any parse, signature or expiry problem
    pub fn decode_claims(&self, token: &str) -> AppResult<Claims> {
        self.validate_token_detailed(token).map_err(AppError::from)
    }

    /// Verify `token` and require it to belong to `actor`
    ///
    /// # Errors
    ///
    /// Returns `TOKEN_VALIDATION_FAILED` if the token is invalid or names another subject
    pub fn validate_for(
        &self,
        token: &str,
        actor: &(impl TokenSubject + ?Sized),
    ) -> AppResult<Claims> {
        let claims = self.decode_claims(token)?;
        if claims.sub != actor.identity() {
            warn!(
                token = %token_prefix(token),
                "Access token subject does not match the presented actor"
            );
            return Err(AppError::token_validation(
                "Token subject does not match actor",
            ));
        }
        Ok(claims)
    }

    /// Validate a token with detailed error information
    ///
    /// # Errors
    ///
    /// Returns a [`JwtValidationError`] if:
    /// - The token is not a well-formed JWT
    /// - The signature does not match the resolved key
    /// - The token has expired (`now >= exp`)
    pub fn validate_token_detailed(&self, token: &str) -> Result<Claims, JwtValidationError> {
        let claims = self.decode_token_claims(token).inspect_err(|e| {
            warn!(token = %token_prefix(token), "Access token rejected: {e}");
        })?;
        self.check_expiry(&claims).inspect_err(|e| {
            warn!(sub = %claims.sub, "Access token rejected: {e}");
        })?;
        Ok(claims)
    }

    /// Decode and check the signature without expiry validation
    fn decode_token_claims(&self, token: &str) -> Result<Claims, JwtValidationError> {
        let header = decode_header(token).map_err(|e| JwtValidationError::TokenMalformed {
            details: format!("Failed to decode token header: {e}"),
        })?;

        if header.alg != TOKEN_ALGORITHM {
            return Err(JwtValidationError::TokenInvalid {
                reason: format!("Unexpected signing algorithm {:?}", header.alg),
            });
        }

        let key = self.keys.resolve(header.kid.as_deref());

        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;

        decode::<Claims>(token, &key.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| convert_jwt_error(&e))
    }

    fn check_expiry(&self, claims: &Claims) -> Result<(), JwtValidationError> {
        let current_time = self.clock.now();
        let expired_at =
            claims
                .expires_at()
                .ok_or_else(|| JwtValidationError::TokenMalformed {
                    details: format!("Expiry {} is out of range", claims.exp),
                })?;

        if current_time >= expired_at {
            return Err(JwtValidationError::TokenExpired {
                expired_at,
                current_time,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

fn convert_jwt_error(e: &jsonwebtoken::errors::Error) -> JwtValidationError {
    use jsonwebtoken::errors::ErrorKind;

    match e.kind() {
        ErrorKind::InvalidSignature => JwtValidationError::TokenInvalid {
            reason: "Token signature verification failed".into(),
        },
        ErrorKind::InvalidToken => JwtValidationError::TokenMalformed {
            details: "Token format is invalid".into(),
        },
        ErrorKind::Base64(base64_err) => JwtValidationError::TokenMalformed {
            details: format!("Token contains invalid base64: {base64_err}"),
        },
        ErrorKind::Json(json_err) => JwtValidationError::TokenMalformed {
            details: format!("Token contains invalid JSON: {json_err}"),
        },
        ErrorKind::Utf8(utf8_err) => JwtValidationError::TokenMalformed {
            details: format!("Token contains invalid UTF-8: {utf8_err}"),
        },
        _ => JwtValidationError::TokenInvalid {
            reason: format!("Token validation failed: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn codec() -> (TokenCodec, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let keys = Arc::new(SigningKeyStore::new(clock.clone(), Duration::hours(1)).unwrap());
        (TokenCodec::new(keys, clock.clone()), clock)
    }

    #[test]
    fn test_header_carries_current_kid() {
        let (codec, _) = codec();
        let token = codec.issue("user@example.com", Duration::hours(1)).unwrap();
        let header = decode_header(&token).unwrap();

        assert_eq!(header.alg, Algorithm::HS512);
        assert_eq!(
            header.kid.as_deref(),
            Some(codec.key_store().current().kid())
        );
    }

    #[test]
    fn test_exp_rounds_up_sub_second_ttl() {
        let (codec, _) = codec();
        let token = codec
            .issue("user@example.com", Duration::milliseconds(1))
            .unwrap();
        let claims = codec.decode_claims(&token).unwrap();

        assert_eq!(claims.exp, claims.iat + 1);
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let (codec, _) = codec();
        let error = codec.issue("user@example.com", Duration::zero()).unwrap_err();
        assert_eq!(error.code, crate::errors::ErrorCode::InvalidInput);
    }

    #[test]
    fn test_unrepresentable_ttl_rejected() {
        let (codec, _) = codec();
        let error = codec.issue("user@example.com", Duration::MAX).unwrap_err();
        assert_eq!(error.code, crate::errors::ErrorCode::InvalidInput);

        let ttl = Duration::milliseconds(9_000_000_000_000_000);
        assert!(codec.issue("user@example.com", ttl).is_err());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let (codec, _) = codec();
        let error = codec.validate_token_detailed("not-a-jwt").unwrap_err();
        assert_eq!(error.reason_code(), "malformed");
    }

    #[test]
    fn test_expired_error_converts_to_validation_failure() {
        let (codec, clock) = codec();
        let token = codec.issue("user@example.com", Duration::seconds(5)).unwrap();
        clock.advance(Duration::seconds(5));

        let error = codec.verify(&token).unwrap_err();
        assert!(error.is_unauthenticated());
        assert_eq!(error.details["reason"], "expired");
    }
}
