// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::auth::{
    CurrentUser, KeyFetcher, KeySetCache, KeySetError, Role, TokenVerifier, VerificationPolicy,
};
use crate::state::AppState;
use crate::storage::{Database, ProfileHints};

/// Key endpoint that is never reachable.
pub(crate) struct UnreachableFetcher;

#[async_trait]
impl KeyFetcher for UnreachableFetcher {
    async fn fetch(&self) -> Result<Vec<u8>, KeySetError> {
        Err(KeySetError::Http("connection refused".to_string()))
    }
}

/// App state over a fresh temporary database and an unreachable key endpoint.
pub(crate) fn test_state() -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("users.redb")).unwrap());
    let keys = Arc::new(KeySetCache::new(Arc::new(UnreachableFetcher)));
    let verifier = TokenVerifier::new(keys, VerificationPolicy::new("https://issuer.test"));
    (AppState::new(db, verifier, Duration::from_secs(5)), dir)
}

/// Create `subject` as a new user with `role`, as the `Auth` extractor would.
pub(crate) async fn signed_in(state: &AppState, subject: &str, role: Role) -> CurrentUser {
    let hints = ProfileHints {
        email: Some(format!("{subject}@example.com")),
        role: Some(role),
        ..ProfileHints::default()
    };
    let resolved = state.users.resolve(subject, &hints).await.unwrap();
    let created = resolved.was_created();
    let user = resolved.into_user();
    CurrentUser {
        user,
        claims: serde_json::from_value(serde_json::json!({
            "sub": subject,
            "exp": 4_102_444_800_i64,
            "iss": "https://issuer.test",
            "email": format!("{subject}@example.com")
        }))
        .unwrap(),
        created,
    }
}
