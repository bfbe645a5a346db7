// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EduConnect User Service - identity and subscription microservice
//!
//! This crate verifies bearer tokens issued by an external identity provider,
//! maps them to internal user records, and maintains the subscription relation
//! between users and content series.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Key set cache, token verification, request extractors
//! - `key_refresher` - Background key set refresh
//! - `storage` - User directory and subscription store (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod key_refresher;
pub mod models;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
