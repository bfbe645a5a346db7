// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer token verification against the identity provider's published keys.
//!
//! ## Auth Flow
//!
//! 1. Client authenticates with the identity provider (Cognito user pool)
//! 2. Client sends `Authorization: Bearer <JWT>`
//! 3. Service:
//!    - Resolves the token's `kid` in the cached key set (HTTPS-fetched)
//!    - Verifies signature, expiry, issuer, audience
//!    - Maps `sub` to an internal user, creating it on first sight
//!
//! ## Security
//!
//! - Header algorithms outside the configured allow-list are rejected before
//!   any key lookup
//! - A key's declared algorithm must equal the token's
//! - Key set outages surface as 503, never as an accepted token

pub mod claims;
pub mod error;
pub mod extractor;
pub mod keyset;
pub mod roles;
pub mod verifier;

pub use claims::{Audience, TokenUse, VerifiedClaims};
pub use error::{AuthError, VerificationError};
pub use extractor::{Auth, CurrentUser, InstructorOnly};
pub use keyset::{HttpKeyFetcher, KeyFetcher, KeySet, KeySetCache, KeySetError, SigningKey};
pub use roles::Role;
pub use verifier::{TokenVerifier, VerificationPolicy};
