// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access, including other users' subscriptions
/// - `Instructor` - Manages series: subscriber lists and series retirement
/// - `Student` - Normal user, manages only their own subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Series author / instructor
    Instructor,
    /// Default role for every user created on first sign-in
    #[default]
    Student,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Instructor, Role::Instructor | Role::Student) => true,
            (Role::Student, Role::Student) => true,
            _ => false,
        }
    }

    /// Parse role from string (case-insensitive).
    ///
    /// Identity-provider group names are usually plural (`Instructors`), so a
    /// single trailing `s` is accepted too.
    pub fn parse(s: &str) -> Option<Role> {
        let name = s.trim().to_lowercase();
        let singular = name.strip_suffix('s').unwrap_or(&name);
        match (name.as_str(), singular) {
            ("admin", _) | (_, "admin") => Some(Role::Admin),
            ("instructor", _) | (_, "instructor") => Some(Role::Instructor),
            ("student", _) | (_, "student") => Some(Role::Student),
            _ => None,
        }
    }

    /// Highest-privilege role among `names`, ignoring names that are not roles.
    pub fn highest<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<Role> {
        names.into_iter().filter_map(Role::parse).max_by_key(|role| role.rank())
    }

    fn rank(self) -> u8 {
        match self {
            Role::Student => 0,
            Role::Instructor => 1,
            Role::Admin => 2,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Instructor => write!(f, "instructor"),
            Role::Student => write!(f, "student"),
        }
    }
}
