// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::Role,
    models::{
        SeriesRemovedResponse, SubscribeRequest, SubscribersResponse, UserSubscriptionsResponse,
        VerifyResponse,
    },
    state::AppState,
    storage::{Subscription, User},
};

pub mod auth;
pub mod health;
pub mod subscriptions;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/verify", post(auth::verify_token))
        .route("/users/me", get(users::get_current_user))
        .route("/users/sync", post(users::sync_user))
        .route("/users/{user_id}", get(users::get_user))
        .route(
            "/users/{user_id}/subscriptions",
            get(subscriptions::list_user_subscriptions).post(subscriptions::subscribe),
        )
        .route(
            "/users/{user_id}/subscriptions/{series_id}",
            delete(subscriptions::unsubscribe),
        )
        .route(
            "/series/{series_id}/subscribers",
            get(subscriptions::list_subscribers),
        )
        .route(
            "/series/{series_id}/subscriptions",
            delete(subscriptions::remove_series),
        );

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::permissive()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        auth::verify_token,
        users::get_current_user,
        users::sync_user,
        users::get_user,
        subscriptions::list_user_subscriptions,
        subscriptions::subscribe,
        subscriptions::unsubscribe,
        subscriptions::list_subscribers,
        subscriptions::remove_series
    ),
    components(
        schemas(
            Role,
            User,
            Subscription,
            VerifyResponse,
            SubscribeRequest,
            UserSubscriptionsResponse,
            SubscribersResponse,
            SeriesRemovedResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Auth", description = "Bearer token verification"),
        (name = "Users", description = "User directory"),
        (name = "Subscriptions", description = "User and series subscriptions")
    )
)]
struct ApiDoc;
