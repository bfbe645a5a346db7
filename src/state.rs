// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenVerifier;
use crate::storage::{Database, SubscriptionStore, UserDirectory};

#[derive(Clone)]
pub struct AppState {
    pub verifier: TokenVerifier,
    pub users: UserDirectory,
    pub subscriptions: SubscriptionStore,
    pub db: Arc<Database>,
    /// Bound applied to every storage call.
    pub store_timeout: Duration,
}

impl AppState {
    pub fn new(db: Arc<Database>, verifier: TokenVerifier, store_timeout: Duration) -> Self {
        Self {
            users: UserDirectory::new(db.clone(), store_timeout),
            subscriptions: SubscriptionStore::new(db.clone(), store_timeout),
            verifier,
            db,
            store_timeout,
        }
    }
}
