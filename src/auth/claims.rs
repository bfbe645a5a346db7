// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified token claims.

use serde::{Deserialize, Serialize};

use super::Role;
use crate::storage::ProfileHints;

/// Which identity-provider token flavour was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    /// ID token: carries profile claims, audience in `aud`
    Id,
    /// Access token: no `aud`, the app client is in `client_id`
    Access,
}

/// `aud` is either a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Multiple(auds) => auds.iter().any(|a| a == expected),
        }
    }
}

/// Claims of a token that passed signature verification.
///
/// Only [`TokenVerifier`](super::TokenVerifier) produces these after every
/// check has passed. Known claims are typed; everything else is kept in
/// `extra` so downstream code never re-parses the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// Subject (`sub`): the identity provider's id for the user
    #[serde(rename = "sub")]
    pub subject: String,

    #[serde(rename = "iat", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,

    #[serde(rename = "exp")]
    pub expires_at: i64,

    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<i64>,

    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<TokenUse>,

    /// App client id (access tokens only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(rename = "cognito:username", default, skip_serializing_if = "Option::is_none")]
    pub provider_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(rename = "cognito:groups", default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Every claim not modelled above
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VerifiedClaims {
    /// The user-facing username, preferring the most explicit claim.
    pub fn username(&self) -> Option<&str> {
        self.preferred_username
            .as_deref()
            .or(self.provider_username.as_deref())
            .or(self.username.as_deref())
    }

    /// Whether this is an access token.
    pub fn is_access_token(&self) -> bool {
        self.token_use == Some(TokenUse::Access)
    }

    /// Role granted by the identity provider's group membership, if any group
    /// names a role. The most privileged one wins.
    pub fn role(&self) -> Option<Role> {
        Role::highest(self.groups.iter().map(String::as_str))
    }

    /// Profile data for first-sight user creation.
    pub fn profile_hints(&self) -> ProfileHints {
        ProfileHints {
            email: self.email.clone(),
            name: self.name.clone(),
            username: self.username().map(str::to_string),
            role: self.role(),
        }
    }
}
