// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token verification endpoint.

use axum::Json;

use crate::{auth::Auth, models::VerifyResponse};

/// Verify the bearer token and return the caller's identity.
///
/// A subject seen for the first time gets a user record as a side effect.
#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Token is missing, malformed, expired, or not issued for this service"),
        (status = 503, description = "Signing keys or user directory unavailable"),
    )
)]
pub async fn verify_token(Auth(current): Auth) -> Json<VerifyResponse> {
    Json(VerifyResponse::from(&current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::test_support::{signed_in, test_state};

    #[tokio::test]
    async fn verify_reports_identity() {
        let (state, _dir) = test_state();
        let current = signed_in(&state, "sub-ada", Role::Instructor).await;

        let Json(response) = verify_token(Auth(current.clone())).await;
        assert_eq!(response.user_id, current.user.id);
        assert_eq!(response.subject, "sub-ada");
        assert_eq!(response.email.as_deref(), Some("sub-ada@example.com"));
        assert_eq!(response.role, Role::Instructor);
        assert!(response.created);
    }
}
