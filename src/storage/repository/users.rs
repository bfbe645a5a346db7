// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User directory: maps identity-provider subjects to internal users.
//!
//! A user is created the first time a verified subject is seen. Creation is an
//! insert-or-get inside a single redb write transaction: the subject index is
//! checked and written in the same transaction as the user record, so two
//! concurrent first sign-ins for one subject produce one user, and the later
//! writer gets the earlier writer's record back as `Existing`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;
use crate::storage::database::{run_blocking, validate_id, Database, USERS, USER_SUBJECTS};
use crate::storage::{StoreError, StoreResult};

/// User record persisted in the directory.
///
/// Fields added after the first schema carry `#[serde(default)]` so older
/// records keep deserializing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct User {
    /// Internal user id (UUID), the key used by every relation
    pub id: String,
    /// Identity-provider subject (`sub` claim)
    pub external_subject: String,
    #[serde(default)]
    pub email: Option<String>,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub birthdate: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

/// Optional profile data taken from verified claims on first sight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileHints {
    pub email: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
    /// Role from identity-provider groups; `Student` when absent.
    pub role: Option<Role>,
}

impl User {
    /// Build a new user with default profile fields.
    fn first_sight(subject: &str, hints: &ProfileHints, now: DateTime<Utc>) -> Self {
        let email_local = hints
            .email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.is_empty())
            .map(str::to_string);

        let username = hints
            .username
            .clone()
            .or_else(|| email_local.clone())
            .unwrap_or_else(|| subject.to_string());
        let name = hints
            .name
            .clone()
            .or(email_local)
            .unwrap_or_else(|| username.clone());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_subject: subject.to_string(),
            email: hints.email.clone(),
            name,
            username,
            role: hints.role.unwrap_or_default(),
            avatar: String::new(),
            bio: String::new(),
            gender: String::new(),
            birthdate: String::new(),
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }
}

/// Outcome of [`UserDirectory::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The subject was unseen; this call created the user.
    Created(User),
    /// The subject already had a user.
    Existing(User),
}

impl Resolved {
    pub fn into_user(self) -> User {
        match self {
            Resolved::Created(user) | Resolved::Existing(user) => user,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Resolved::Created(_))
    }
}

fn load_user(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    user_id: &str,
) -> StoreResult<Option<User>> {
    match table.get(user_id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Repository for user records.
#[derive(Clone)]
pub struct UserDirectory {
    db: Arc<Database>,
    timeout: Duration,
}

impl UserDirectory {
    /// Create a directory over `db`; every call is bounded by `timeout`.
    pub fn new(db: Arc<Database>, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Look up the user for `subject`, creating it if this is its first sight.
    ///
    /// Existing users are returned unchanged; hints only shape new records.
    pub async fn resolve(&self, subject: &str, hints: &ProfileHints) -> StoreResult<Resolved> {
        if let Some(user) = self.get_by_subject(subject).await? {
            return Ok(Resolved::Existing(user));
        }

        let db = self.db.clone();
        let subject = subject.to_string();
        let hints = hints.clone();
        let resolved = run_blocking("users.resolve", self.timeout, move || {
            insert_or_get(&db, &subject, &hints)
        })
        .await?;

        if let Resolved::Created(user) = &resolved {
            tracing::info!(
                user_id = %user.id,
                subject = %user.external_subject,
                "User created on first sight"
            );
        }
        Ok(resolved)
    }

    /// Get a user by internal id.
    pub async fn get(&self, user_id: &str) -> StoreResult<User> {
        validate_id("user_id", user_id)?;
        let db = self.db.clone();
        let user_id = user_id.to_string();
        run_blocking("users.get", self.timeout, move || {
            let read_txn = db.inner().begin_read()?;
            let users = read_txn.open_table(USERS)?;
            load_user(&users, &user_id)?.ok_or_else(|| StoreError::NotFound(format!("User {user_id}")))
        })
        .await
    }

    /// Get the user bound to an identity-provider subject, if any.
    pub async fn get_by_subject(&self, subject: &str) -> StoreResult<Option<User>> {
        validate_id("subject", subject)?;
        let db = self.db.clone();
        let subject = subject.to_string();
        run_blocking("users.get_by_subject", self.timeout, move || {
            lookup_by_subject(&db, &subject)
        })
        .await
    }

    /// Get every user in `user_ids` that exists, in input order.
    pub async fn get_many(&self, user_ids: Vec<String>) -> StoreResult<Vec<User>> {
        let db = self.db.clone();
        run_blocking("users.get_many", self.timeout, move || {
            let read_txn = db.inner().begin_read()?;
            let users = read_txn.open_table(USERS)?;
            let mut found = Vec::with_capacity(user_ids.len());
            for id in &user_ids {
                if let Some(user) = load_user(&users, id)? {
                    found.push(user);
                }
            }
            Ok(found)
        })
        .await
    }

    /// Stamp a sign-in on the user (`last_login`, `updated_at`), adopting
    /// `role` when the identity provider granted one.
    pub async fn record_login(&self, user_id: &str, role: Option<Role>) -> StoreResult<User> {
        validate_id("user_id", user_id)?;
        self.update("users.record_login", user_id, move |user, now| {
            user.last_login = Some(now);
            if let Some(role) = role {
                user.role = role;
            }
        })
        .await
    }

    async fn update<F>(&self, operation: &'static str, user_id: &str, apply: F) -> StoreResult<User>
    where
        F: FnOnce(&mut User, DateTime<Utc>) + Send + 'static,
    {
        let db = self.db.clone();
        let user_id = user_id.to_string();
        run_blocking(operation, self.timeout, move || {
            let write_txn = db.inner().begin_write()?;
            let user = {
                let mut users = write_txn.open_table(USERS)?;
                let mut user = load_user(&users, &user_id)?
                    .ok_or_else(|| StoreError::NotFound(format!("User {user_id}")))?;
                let now = Utc::now();
                apply(&mut user, now);
                user.updated_at = now;
                let json = serde_json::to_vec(&user)?;
                users.insert(user_id.as_str(), json.as_slice())?;
                user
            };
            write_txn.commit()?;
            Ok(user)
        })
        .await
    }
}

fn lookup_by_subject(db: &Database, subject: &str) -> StoreResult<Option<User>> {
    let read_txn = db.inner().begin_read()?;
    let subjects = read_txn.open_table(USER_SUBJECTS)?;
    let user_id = match subjects.get(subject)? {
        Some(v) => v.value().to_string(),
        None => return Ok(None),
    };
    let users = read_txn.open_table(USERS)?;
    match load_user(&users, &user_id)? {
        Some(user) => Ok(Some(user)),
        None => Err(StoreError::Internal(format!(
            "subject {subject} points at missing user {user_id}"
        ))),
    }
}

fn insert_or_get(db: &Database, subject: &str, hints: &ProfileHints) -> StoreResult<Resolved> {
    let write_txn = db.inner().begin_write()?;
    let resolved = {
        let mut subjects = write_txn.open_table(USER_SUBJECTS)?;
        let mut users = write_txn.open_table(USERS)?;
        let bound = subjects.get(subject)?.map(|v| v.value().to_string());

        match bound {
            // Lost the race to another first sign-in; use its record.
            Some(user_id) => {
                let user = load_user(&users, &user_id)?.ok_or_else(|| {
                    StoreError::Internal(format!("subject {subject} points at missing user {user_id}"))
                })?;
                Resolved::Existing(user)
            }
            None => {
                let user = User::first_sight(subject, hints, Utc::now());
                let json = serde_json::to_vec(&user)?;
                users.insert(user.id.as_str(), json.as_slice())?;
                subjects.insert(subject, user.id.as_str())?;
                Resolved::Created(user)
            }
        }
    };

    if resolved.was_created() {
        write_txn.commit()?;
    } else {
        write_txn.abort()?;
    }
    Ok(resolved)
}
