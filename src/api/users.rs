// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{auth::Auth, error::ApiError, state::AppState, storage::User};

fn created_or_ok(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// Get the current authenticated user's record.
///
/// Returns 201 when this request created the user.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = User),
        (status = 201, description = "User created on first sight", body = User),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(Auth(current): Auth) -> (StatusCode, Json<User>) {
    (created_or_ok(current.created), Json(current.user))
}

/// Resolve the caller and record a sign-in.
///
/// A role granted through the token's groups is stored on the user.
#[utoipa::path(
    post,
    path = "/v1/users/sync",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Existing user synced", body = User),
        (status = 201, description = "User created and synced", body = User),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn sync_user(
    State(state): State<AppState>,
    Auth(current): Auth,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state
        .users
        .record_login(&current.user.id, current.claims.role())
        .await?;
    Ok((created_or_ok(current.created), Json(user)))
}

/// Get a user by internal id.
#[utoipa::path(
    get,
    path = "/v1/users/{user_id}",
    params(
        ("user_id" = String, Path, description = "Internal user id")
    ),
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = User),
        (status = 404, description = "Unknown user"),
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Auth(_current): Auth,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.get(&user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::test_support::{signed_in, test_state};

    #[tokio::test]
    async fn me_is_created_then_ok() {
        let (state, _dir) = test_state();
        let current = signed_in(&state, "sub-ada", Role::Student).await;

        let (status, Json(user)) = get_current_user(Auth(current.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user.external_subject, "sub-ada");

        let again = crate::auth::CurrentUser {
            created: false,
            ..current
        };
        let (status, _) = get_current_user(Auth(again)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn sync_records_login() {
        let (state, _dir) = test_state();
        let current = signed_in(&state, "sub-ada", Role::Student).await;

        let (_, Json(user)) = sync_user(State(state.clone()), Auth(current)).await.unwrap();
        assert!(user.last_login.is_some());
        assert_eq!(state.users.get(&user.id).await.unwrap().last_login, user.last_login);
    }

    #[tokio::test]
    async fn sync_persists_group_role() {
        let (state, _dir) = test_state();
        let mut current = signed_in(&state, "sub-ada", Role::Student).await;
        current.claims.groups = vec!["Instructors".to_string()];

        let (_, Json(user)) = sync_user(State(state.clone()), Auth(current)).await.unwrap();
        assert_eq!(user.role, Role::Instructor);
        assert_eq!(state.users.get(&user.id).await.unwrap().role, Role::Instructor);
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let (state, _dir) = test_state();
        let current = signed_in(&state, "sub-ada", Role::Student).await;

        let err = get_user(State(state), Auth(current), Path("ghost".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
