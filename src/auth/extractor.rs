// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(current): Auth) -> impl IntoResponse {
//!     // current.user is the directory record, current.claims the verified token
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, Role, VerifiedClaims};
use crate::state::AppState;
use crate::storage::User;

/// The caller of the current request: a verified token mapped to a user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub claims: VerifiedClaims,
    /// Whether this request created the user record.
    pub created: bool,
}

impl CurrentUser {
    /// Check if the user has the required role.
    pub fn has_role(&self, required: Role) -> bool {
        self.user.role.has_privilege(required)
    }

    /// Whether the caller may act on `user_id`'s data: their own, or any as admin.
    pub fn can_act_for(&self, user_id: &str) -> bool {
        self.user.id == user_id || self.user.role == Role::Admin
    }
}

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Extractor for authenticated users.
///
/// Verifies the bearer token, then resolves the subject in the user directory,
/// creating the user on first sight. A role granted through the token's groups
/// overrides the stored one for the request.
///
/// # Example
///
/// ```rust,ignore
/// async fn list_subscriptions(
///     Auth(current): Auth,
///     State(state): State<AppState>,
/// ) -> Result<Json<Vec<String>>, ApiError> {
///     // current.user.id is the internal user id
/// }
/// ```
pub struct Auth(pub CurrentUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // A layer or test may have resolved the caller already
        if let Some(current) = parts.extensions.get::<CurrentUser>().cloned() {
            return Ok(Auth(current));
        }

        let token = bearer_token(parts)?;
        let claims = state.verifier.verify(token).await?;
        let resolved = state
            .users
            .resolve(&claims.subject, &claims.profile_hints())
            .await?;

        let created = resolved.was_created();
        let mut user = resolved.into_user();
        // Group membership in the token is authoritative for this request;
        // `POST /v1/users/sync` persists it.
        if let Some(role) = claims.role() {
            user.role = role;
        }

        let current = CurrentUser {
            user,
            claims,
            created,
        };
        parts.extensions.insert(current.clone());
        Ok(Auth(current))
    }
}

/// Extractor that requires the instructor role (admins pass too).
pub struct InstructorOnly(pub CurrentUser);

impl FromRequestParts<AppState> for InstructorOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(current) = Auth::from_request_parts(parts, state).await?;

        if !current.has_role(Role::Instructor) {
            return Err(AuthError::InsufficientPermissions);
        }

        Ok(InstructorOnly(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::http::Request;

    fn current(role: Role) -> CurrentUser {
        let now = chrono::Utc::now();
        CurrentUser {
            user: User {
                id: "user-1".to_string(),
                external_subject: "sub-1".to_string(),
                email: None,
                name: "Ada".to_string(),
                username: "ada".to_string(),
                role,
                avatar: String::new(),
                bio: String::new(),
                gender: String::new(),
                birthdate: String::new(),
                created_at: now,
                updated_at: now,
                last_login: None,
            },
            claims: serde_json::from_value(serde_json::json!({"sub": "sub-1", "exp": 0})).unwrap(),
            created: false,
        }
    }

    fn parts(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let (state, _dir) = test_state();
        let mut parts = parts(None);
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_invalid() {
        let (state, _dir) = test_state();
        let mut parts = parts(Some("Basic dXNlcjpwYXNz"));
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidAuthHeader)));

        let mut parts = self::parts(Some("Bearer   "));
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidAuthHeader)));
    }

    #[tokio::test]
    async fn garbage_token_is_malformed() {
        let (state, _dir) = test_state();
        let mut parts = parts(Some("Bearer not-a-jwt"));
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(
            result,
            Err(AuthError::Verification(super::super::VerificationError::MalformedToken))
        ));
    }

    #[tokio::test]
    async fn auth_extractor_prefers_extensions() {
        let (state, _dir) = test_state();
        let mut parts = parts(None);
        parts.extensions.insert(current(Role::Student));

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user.id, "user-1");
    }

    #[tokio::test]
    async fn instructor_only_rejects_students() {
        let (state, _dir) = test_state();
        let mut parts = parts(None);
        parts.extensions.insert(current(Role::Student));

        let result = InstructorOnly::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InsufficientPermissions)));
    }

    #[tokio::test]
    async fn instructor_only_admits_admins() {
        let (state, _dir) = test_state();
        let mut parts = parts(None);
        parts.extensions.insert(current(Role::Admin));

        assert!(InstructorOnly::from_request_parts(&mut parts, &state).await.is_ok());
    }

    #[test]
    fn only_self_or_admin_can_act_for_user() {
        assert!(current(Role::Student).can_act_for("user-1"));
        assert!(!current(Role::Student).can_act_for("user-2"));
        assert!(!current(Role::Instructor).can_act_for("user-2"));
        assert!(current(Role::Admin).can_act_for("user-2"));
    }
}
