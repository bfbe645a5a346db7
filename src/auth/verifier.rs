// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! ## Pipeline
//!
//! 1. Decode the header (untrusted) for `kid` and `alg`
//! 2. Reject any `alg` outside the allow-list
//! 3. Resolve the signing key through the [`KeySetCache`]
//! 4. Verify the signature with that key and its declared algorithm
//! 5. Check `exp`, `nbf` and `iat` against the current time (with leeway)
//! 6. Check `iss` and the audience exactly
//!
//! Only step 3 performs I/O. Everything after it is a pure function of the
//! token, the resolved key and the clock.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};

use super::claims::VerifiedClaims;
use super::error::VerificationError;
use super::keyset::KeySetCache;

/// What a token must satisfy to be accepted.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    /// Exact expected `iss`
    pub issuer: String,
    /// Expected `aud` (ID tokens) or `client_id` (access tokens); unchecked when `None`
    pub audience: Option<String>,
    /// Header algorithms accepted at all
    pub allowed_algorithms: Vec<Algorithm>,
    /// Clock skew tolerance, seconds
    pub leeway: u64,
}

impl VerificationPolicy {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: None,
            allowed_algorithms: vec![Algorithm::RS256],
            leeway: 0,
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }
}

/// Verifies bearer tokens against the issuer's published keys.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    policy: Arc<VerificationPolicy>,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeySetCache>, policy: VerificationPolicy) -> Self {
        Self {
            keys,
            policy: Arc::new(policy),
        }
    }

    pub fn keys(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Verify `token` against the current time.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, VerificationError> {
        self.verify_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Verify `token` as of `now` (Unix seconds).
    pub async fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedClaims, VerificationError> {
        let header = decode_header(token).map_err(|_| VerificationError::MalformedToken)?;
        let key_id = header.kid.ok_or(VerificationError::MalformedToken)?;

        if !self.policy.allowed_algorithms.contains(&header.alg) {
            tracing::debug!(alg = ?header.alg, "Rejected token algorithm");
            return Err(VerificationError::DisallowedAlgorithm);
        }

        let key = self.keys.get_key(&key_id).await?;
        if key.algorithm != header.alg {
            return Err(VerificationError::DisallowedAlgorithm);
        }

        // Signature only; time and identity checks follow with our own semantics.
        let mut validation = Validation::new(key.algorithm);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let claims = decode::<VerifiedClaims>(token, key.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::InvalidEcdsaKey
                | ErrorKind::InvalidEddsaKey
                | ErrorKind::InvalidKeyFormat => VerificationError::BadSignature,
                ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                    VerificationError::DisallowedAlgorithm
                }
                _ => VerificationError::MalformedToken,
            })?
            .claims;

        self.check_times(&claims, now)?;
        self.check_identity(&claims)?;
        Ok(claims)
    }

    fn check_times(&self, claims: &VerifiedClaims, now: i64) -> Result<(), VerificationError> {
        let leeway = i64::try_from(self.policy.leeway).unwrap_or(i64::MAX);

        if now >= claims.expires_at.saturating_add(leeway) {
            return Err(VerificationError::Expired);
        }
        let earliest = [claims.not_before, claims.issued_at].into_iter().flatten().max();
        if let Some(earliest) = earliest {
            if now.saturating_add(leeway) < earliest {
                return Err(VerificationError::NotYetValid);
            }
        }
        Ok(())
    }

    fn check_identity(&self, claims: &VerifiedClaims) -> Result<(), VerificationError> {
        if claims.issuer.as_deref() != Some(self.policy.issuer.as_str()) {
            return Err(VerificationError::IssuerMismatch);
        }

        let Some(expected) = self.policy.audience.as_deref() else {
            return Ok(());
        };
        let matches = if claims.is_access_token() {
            claims.client_id.as_deref() == Some(expected)
        } else {
            claims.audience.as_ref().is_some_and(|aud| aud.contains(expected))
        };
        if matches {
            Ok(())
        } else {
            Err(VerificationError::AudienceMismatch)
        }
    }
}
