// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the database.
//!
//! Each repository owns one concern and wraps every call in a bounded
//! blocking task.

pub mod subscriptions;
pub mod users;

pub use subscriptions::{Added, Subscription, SubscriptionStore};
pub use users::{ProfileHints, Resolved, User, UserDirectory};
