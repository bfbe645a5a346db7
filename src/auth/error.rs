// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! [`VerificationError`] is what the token pipeline produces; [`AuthError`] is
//! what the request boundary rejects with. Every verification kind maps to a
//! status code the caller can act on: dependency outages (`KeyUnavailable`,
//! `KeyTimeout`) are 503, everything else is a 401.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StoreError;

/// Failure kinds produced while verifying a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// Token could not be split, decoded or deserialized
    #[error("Token is malformed")]
    MalformedToken,
    /// Declared algorithm is not allowed for this service or this key
    #[error("Token algorithm is not allowed")]
    DisallowedAlgorithm,
    /// No signing key with the token's key id, even after a refresh
    #[error("No signing key matches the token key id")]
    UnknownKey,
    /// Signature does not match the signed payload
    #[error("Token signature is invalid")]
    BadSignature,
    /// `exp` is in the past
    #[error("Token has expired")]
    Expired,
    /// `nbf` or `iat` is in the future
    #[error("Token is not yet valid")]
    NotYetValid,
    /// `iss` differs from the configured issuer
    #[error("Token issuer is invalid")]
    IssuerMismatch,
    /// `aud` (or `client_id` for access tokens) differs from the configured audience
    #[error("Token audience is invalid")]
    AudienceMismatch,
    /// Key set could not be fetched and nothing is cached
    #[error("Signing keys are unavailable: {0}")]
    KeyUnavailable(String),
    /// Key set refresh exceeded its time bound and nothing is cached
    #[error("Timed out fetching signing keys")]
    KeyTimeout,
}

impl VerificationError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            VerificationError::MalformedToken => "malformed_token",
            VerificationError::DisallowedAlgorithm => "disallowed_algorithm",
            VerificationError::UnknownKey => "unknown_key",
            VerificationError::BadSignature => "bad_signature",
            VerificationError::Expired => "token_expired",
            VerificationError::NotYetValid => "token_not_yet_valid",
            VerificationError::IssuerMismatch => "issuer_mismatch",
            VerificationError::AudienceMismatch => "audience_mismatch",
            VerificationError::KeyUnavailable(_) => "key_unavailable",
            VerificationError::KeyTimeout => "key_timeout",
        }
    }

    /// Whether the failure is a dependency outage rather than a bad credential.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            VerificationError::KeyUnavailable(_) | VerificationError::KeyTimeout
        )
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        if self.is_dependency_failure() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::UNAUTHORIZED
        }
    }
}

/// Authentication error type returned by the request boundary.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,
    /// Invalid authorization header format
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Token verification failed
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// Caller is authenticated but lacks the required role or ownership
    #[error("Insufficient permissions for this operation")]
    InsufficientPermissions,
    /// User directory could not resolve the caller
    #[error("User directory failure: {0}")]
    Directory(#[from] StoreError),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::Verification(e) => e.error_code(),
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::Directory(e) => e.error_code(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => StatusCode::UNAUTHORIZED,
            AuthError::Verification(e) => e.status_code(),
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::Directory(e) => e.status_code(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::time::Duration;

    #[tokio::test]
    async fn missing_auth_returns_401() {
        let response = AuthError::MissingAuthHeader.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[test]
    fn credential_failures_are_401() {
        for err in [
            VerificationError::MalformedToken,
            VerificationError::DisallowedAlgorithm,
            VerificationError::UnknownKey,
            VerificationError::BadSignature,
            VerificationError::Expired,
            VerificationError::NotYetValid,
            VerificationError::IssuerMismatch,
            VerificationError::AudienceMismatch,
        ] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED, "{err:?}");
        }
    }

    #[tokio::test]
    async fn key_outage_returns_503() {
        let response =
            AuthError::from(VerificationError::KeyUnavailable("connection refused".into()))
                .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "key_unavailable");

        assert_eq!(
            VerificationError::KeyTimeout.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn directory_timeout_is_503() {
        let err = AuthError::from(StoreError::Timeout(Duration::from_secs(2)));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn insufficient_permissions_returns_403() {
        let response = AuthError::InsufficientPermissions.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
