// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent user and subscription state in a single embedded redb file.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   users.redb   # users, subject index, both subscription indexes
//! ```
//!
//! ## Important Notes
//!
//! - redb holds an exclusive file lock: one service process per database file
//! - Every repository call runs on the blocking pool under a time bound
//! - A timed-out write may still commit; every write is safe to retry

pub mod database;
pub mod repository;

pub use database::{Database, StoreError, StoreResult, MAX_ID_LEN, SCHEMA_VERSION};
pub use repository::{
    Added, ProfileHints, Resolved, Subscription, SubscriptionStore, User, UserDirectory,
};
