// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! This module defines the request and response data structures used by
//! the REST API. All types derive `Serialize` and `ToSchema` for JSON handling
//! and OpenAPI documentation; request bodies also derive `Deserialize`.
//!
//! ## Model Categories
//!
//! - **Identity**: verification results and the caller's profile
//! - **Subscriptions**: the user ↔ series relation

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{CurrentUser, Role};

// =============================================================================
// Identity Models
// =============================================================================

/// Result of a successful token verification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct VerifyResponse {
    /// Internal user id
    pub user_id: String,
    /// Identity-provider subject
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: String,
    pub role: Role,
    /// Whether this verification created the user.
    pub created: bool,
}

impl From<&CurrentUser> for VerifyResponse {
    fn from(current: &CurrentUser) -> Self {
        Self {
            user_id: current.user.id.clone(),
            subject: current.claims.subject.clone(),
            email: current.user.email.clone(),
            name: current.user.name.clone(),
            role: current.user.role,
            created: current.created,
        }
    }
}

// =============================================================================
// Subscription Models
// =============================================================================

/// Request to subscribe a user to a series.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    /// The series to subscribe to.
    pub series_id: String,
}

/// Series a user is subscribed to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserSubscriptionsResponse {
    pub user_id: String,
    pub series_ids: Vec<String>,
    pub count: usize,
}

/// Users subscribed to a series.
///
/// `emails` holds the addresses of subscribers that have one, for
/// notification fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SubscribersResponse {
    pub series_id: String,
    pub user_ids: Vec<String>,
    pub emails: Vec<String>,
    pub count: usize,
}

/// Result of retiring a series.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SeriesRemovedResponse {
    pub series_id: String,
    /// Subscriptions deleted by this call.
    pub removed: usize,
}
