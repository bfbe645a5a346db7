// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription endpoints.
//!
//! A user's own subscriptions are managed by that user (or an admin). Series
//! wide operations are for instructors and admins.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::{Auth, CurrentUser, InstructorOnly},
    error::ApiError,
    models::{SeriesRemovedResponse, SubscribeRequest, SubscribersResponse, UserSubscriptionsResponse},
    state::AppState,
    storage::{Added, Subscription},
};

/// Ensure the caller may act for `user_id` and that the user exists.
async fn authorize_for_user(
    state: &AppState,
    current: &CurrentUser,
    user_id: &str,
) -> Result<(), ApiError> {
    if !current.can_act_for(user_id) {
        return Err(ApiError::forbidden(
            "Cannot manage another user's subscriptions",
        ));
    }
    if current.user.id != user_id {
        state.users.get(user_id).await?;
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/users/{user_id}/subscriptions",
    params(
        ("user_id" = String, Path, description = "Internal user id")
    ),
    tag = "Subscriptions",
    security(("bearer" = [])),
    responses(
        (status = 200, body = UserSubscriptionsResponse),
        (status = 403, description = "Not the caller's own subscriptions"),
        (status = 404, description = "Unknown user"),
    )
)]
pub async fn list_user_subscriptions(
    State(state): State<AppState>,
    Auth(current): Auth,
    Path(user_id): Path<String>,
) -> Result<Json<UserSubscriptionsResponse>, ApiError> {
    authorize_for_user(&state, &current, &user_id).await?;
    let series_ids = state.subscriptions.list_for_user(&user_id).await?;
    Ok(Json(UserSubscriptionsResponse {
        count: series_ids.len(),
        user_id,
        series_ids,
    }))
}

/// Subscribe a user to a series. Repeating the call is harmless.
#[utoipa::path(
    post,
    path = "/v1/users/{user_id}/subscriptions",
    params(
        ("user_id" = String, Path, description = "Internal user id")
    ),
    request_body = SubscribeRequest,
    tag = "Subscriptions",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Subscription created", body = Subscription),
        (status = 200, description = "Already subscribed", body = Subscription),
        (status = 400, description = "Invalid series id"),
        (status = 403, description = "Not the caller's own subscriptions"),
        (status = 404, description = "Unknown user"),
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    Auth(current): Auth,
    Path(user_id): Path<String>,
    Json(request): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    authorize_for_user(&state, &current, &user_id).await?;
    let (status, subscription) = match state.subscriptions.add(&user_id, &request.series_id).await? {
        Added::Created(s) => (StatusCode::CREATED, s),
        Added::Existing(s) => (StatusCode::OK, s),
    };
    Ok((status, Json(subscription)))
}

/// Unsubscribe. Removing a missing subscription also returns 204.
#[utoipa::path(
    delete,
    path = "/v1/users/{user_id}/subscriptions/{series_id}",
    params(
        ("user_id" = String, Path, description = "Internal user id"),
        ("series_id" = String, Path, description = "Series to unsubscribe from")
    ),
    tag = "Subscriptions",
    security(("bearer" = [])),
    responses(
        (status = 204),
        (status = 403, description = "Not the caller's own subscriptions"),
        (status = 404, description = "Unknown user"),
    )
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Auth(current): Auth,
    Path((user_id, series_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    authorize_for_user(&state, &current, &user_id).await?;
    state.subscriptions.remove(&user_id, &series_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/series/{series_id}/subscribers",
    params(
        ("series_id" = String, Path, description = "Series id")
    ),
    tag = "Subscriptions",
    security(("bearer" = [])),
    responses(
        (status = 200, body = SubscribersResponse),
        (status = 403, description = "Instructor role required"),
    )
)]
pub async fn list_subscribers(
    State(state): State<AppState>,
    InstructorOnly(_current): InstructorOnly,
    Path(series_id): Path<String>,
) -> Result<Json<SubscribersResponse>, ApiError> {
    let user_ids = state.subscriptions.list_subscribers(&series_id).await?;
    let emails = state
        .users
        .get_many(user_ids.clone())
        .await?
        .into_iter()
        .filter_map(|user| user.email)
        .collect();

    Ok(Json(SubscribersResponse {
        count: user_ids.len(),
        series_id,
        user_ids,
        emails,
    }))
}

/// Retire a series: delete every subscription to it.
#[utoipa::path(
    delete,
    path = "/v1/series/{series_id}/subscriptions",
    params(
        ("series_id" = String, Path, description = "Series id")
    ),
    tag = "Subscriptions",
    security(("bearer" = [])),
    responses(
        (status = 200, body = SeriesRemovedResponse),
        (status = 403, description = "Instructor role required"),
    )
)]
pub async fn remove_series(
    State(state): State<AppState>,
    InstructorOnly(current): InstructorOnly,
    Path(series_id): Path<String>,
) -> Result<Json<SeriesRemovedResponse>, ApiError> {
    let removed = state.subscriptions.remove_series(&series_id).await?;
    tracing::info!(
        series_id = %series_id,
        removed,
        by = %current.user.id,
        "Series retired"
    );
    Ok(Json(SeriesRemovedResponse { series_id, removed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::test_support::{signed_in, test_state};

    fn body(series_id: &str) -> Json<SubscribeRequest> {
        Json(SubscribeRequest {
            series_id: series_id.to_string(),
        })
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let (state, _dir) = test_state();
        let ada = signed_in(&state, "sub-ada", Role::Student).await;
        let id = ada.user.id.clone();

        let (status, Json(first)) = subscribe(
            State(state.clone()),
            Auth(ada.clone()),
            Path(id.clone()),
            body("rust-101"),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let (status, Json(second)) =
            subscribe(State(state.clone()), Auth(ada.clone()), Path(id.clone()), body("rust-101"))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, second);

        let Json(list) = list_user_subscriptions(State(state), Auth(ada), Path(id))
            .await
            .unwrap();
        assert_eq!(list.series_ids, vec!["rust-101"]);
        assert_eq!(list.count, 1);
    }

    #[tokio::test]
    async fn students_cannot_touch_other_users() {
        let (state, _dir) = test_state();
        let ada = signed_in(&state, "sub-ada", Role::Student).await;
        let bob = signed_in(&state, "sub-bob", Role::Student).await;

        let err = subscribe(State(state.clone()), Auth(ada), Path(bob.user.id.clone()), body("s1"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(state.subscriptions.list_for_user(&bob.user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn admin_acts_for_users_but_not_ghosts() {
        let (state, _dir) = test_state();
        let admin = signed_in(&state, "sub-root", Role::Admin).await;
        let bob = signed_in(&state, "sub-bob", Role::Student).await;

        let (status, _) = subscribe(
            State(state.clone()),
            Auth(admin.clone()),
            Path(bob.user.id.clone()),
            body("s1"),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let err = list_user_subscriptions(State(state), Auth(admin), Path("ghost".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_series_is_rejected() {
        let (state, _dir) = test_state();
        let ada = signed_in(&state, "sub-ada", Role::Student).await;
        let id = ada.user.id.clone();
        let err = subscribe(State(state), Auth(ada), Path(id), body("  "))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn padded_series_ids_are_rejected_everywhere() {
        let (state, _dir) = test_state();
        let ada = signed_in(&state, "sub-ada", Role::Student).await;
        let id = ada.user.id.clone();
        state.subscriptions.add(&id, "s1").await.unwrap();

        let err = subscribe(State(state.clone()), Auth(ada.clone()), Path(id.clone()), body(" s1 "))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = unsubscribe(
            State(state.clone()),
            Auth(ada),
            Path((id.clone(), " s1 ".to_string())),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(state.subscriptions.list_for_user(&id).await.unwrap(), vec!["s1"]);
    }

    #[tokio::test]
    async fn unsubscribe_missing_is_no_content() {
        let (state, _dir) = test_state();
        let ada = signed_in(&state, "sub-ada", Role::Student).await;
        let id = ada.user.id.clone();
        let status = unsubscribe(State(state), Auth(ada), Path((id, "never".to_string())))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn subscribers_and_cascade() {
        let (state, _dir) = test_state();
        let instructor = signed_in(&state, "sub-instructor", Role::Instructor).await;
        let ada = signed_in(&state, "sub-ada", Role::Student).await;
        let bob = signed_in(&state, "sub-bob", Role::Student).await;
        state.subscriptions.add(&ada.user.id, "s1").await.unwrap();
        state.subscriptions.add(&bob.user.id, "s1").await.unwrap();
        state.subscriptions.add(&bob.user.id, "s2").await.unwrap();

        let Json(subs) = list_subscribers(
            State(state.clone()),
            InstructorOnly(instructor.clone()),
            Path("s1".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(subs.count, 2);
        let mut emails = subs.emails.clone();
        emails.sort();
        assert_eq!(emails, vec!["sub-ada@example.com", "sub-bob@example.com"]);

        let Json(removed) = remove_series(
            State(state.clone()),
            InstructorOnly(instructor),
            Path("s1".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(removed.removed, 2);
        assert!(state.subscriptions.list_subscribers("s1").await.unwrap().is_empty());
        assert_eq!(
            state.subscriptions.list_for_user(&bob.user.id).await.unwrap(),
            vec!["s2"]
        );
    }
}
