// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded user/subscription database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: internal user id → serialized User (JSON bytes)
//! - `user_subjects`: identity-provider subject → internal user id
//! - `subscriptions_by_user`: composite key (user_id\0series_id) → created_at millis
//! - `subscriptions_by_series`: composite key (series_id\0user_id) → created_at millis
//! - `schema_meta`: key → value (schema version)
//!
//! redb serializes write transactions, so a write transaction is the atomic
//! "insert if absent" / "delete if present" primitive the repositories build on.
//! Both subscription tables are only ever mutated together inside one
//! write transaction.

use std::path::Path;
use std::time::Duration;

use axum::http::StatusCode;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: user id → serialized User (JSON bytes).
pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Unique index: external subject → user id.
pub(crate) const USER_SUBJECTS: TableDefinition<&str, &str> = TableDefinition::new("user_subjects");

/// Relation, user-major: `user_id\0series_id` → created_at (Unix millis).
pub(crate) const SUBSCRIPTIONS_BY_USER: TableDefinition<&[u8], i64> =
    TableDefinition::new("subscriptions_by_user");

/// Relation, series-major: `series_id\0user_id` → created_at (Unix millis).
pub(crate) const SUBSCRIPTIONS_BY_SERIES: TableDefinition<&[u8], i64> =
    TableDefinition::new("subscriptions_by_series");

/// Schema bookkeeping: key → value.
const SCHEMA_META: TableDefinition<&str, u64> = TableDefinition::new("schema_meta");

/// Version of the persisted layout written by this build.
pub const SCHEMA_VERSION: u64 = 1;

/// Upper bound on the byte length of any id used in a composite key.
pub const MAX_ID_LEN: usize = 256;

// =============================================================================
// Error Type
// =============================================================================

/// Storage failure kinds surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness conflict escaped an idempotent operation. Always a bug.
    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed stored data or a failed storage task, contained to one request.
    #[error("internal storage failure: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::InvalidInput(_) => "invalid_input",
            StoreError::Unavailable(_) => "store_unavailable",
            StoreError::Timeout(_) => "store_timeout",
            StoreError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StoreError::Unavailable(_) | StoreError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Conflict(_) | StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

macro_rules! unavailable_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Unavailable(e.to_string())
                }
            }
        )+
    };
}

unavailable_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Internal(format!("malformed stored record: {e}"))
    }
}

// =============================================================================
// Composite Key Helpers
// =============================================================================

/// Reject ids that cannot be embedded in a composite key.
pub(crate) fn validate_id(kind: &str, id: &str) -> StoreResult<()> {
    if id.is_empty() {
        return Err(StoreError::InvalidInput(format!("{kind} must not be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(StoreError::InvalidInput(format!(
            "{kind} exceeds {MAX_ID_LEN} bytes"
        )));
    }
    if id.trim() != id {
        return Err(StoreError::InvalidInput(format!(
            "{kind} must not start or end with whitespace"
        )));
    }
    if id.as_bytes().contains(&0) {
        return Err(StoreError::InvalidInput(format!("{kind} contains a NUL byte")));
    }
    Ok(())
}

/// Build a composite key: `first \0 second`.
pub(crate) fn pair_key(first: &str, second: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(first.len() + 1 + second.len());
    key.extend_from_slice(first.as_bytes());
    key.push(0);
    key.extend_from_slice(second.as_bytes());
    key
}

/// Half-open byte range covering every composite key whose first part is `first`.
pub(crate) fn prefix_bounds(first: &str) -> (Vec<u8>, Vec<u8>) {
    let mut start = Vec::with_capacity(first.len() + 1);
    start.extend_from_slice(first.as_bytes());
    let mut end = start.clone();
    start.push(0);
    end.push(1);
    (start, end)
}

/// Extract the second part of a composite key.
pub(crate) fn second_part(key: &[u8]) -> StoreResult<String> {
    let split = key
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| StoreError::Internal("composite key without separator".to_string()))?;
    String::from_utf8(key[split + 1..].to_vec())
        .map_err(|e| StoreError::Internal(format!("composite key is not UTF-8: {e}")))
}

// =============================================================================
// Bounded Execution
// =============================================================================

/// Run synchronous storage work on the blocking pool, bounded by `limit`.
///
/// A timeout reports [`StoreError::Timeout`] but cannot stop the work itself;
/// its transaction may still commit afterwards. Dependency failures are logged
/// here so no caller can swallow them unobserved.
pub(crate) async fn run_blocking<T, F>(operation: &'static str, limit: Duration, work: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let outcome = match tokio::time::timeout(limit, tokio::task::spawn_blocking(work)).await {
        Err(_) => Err(StoreError::Timeout(limit)),
        Ok(Err(join)) => Err(StoreError::Internal(format!("storage task failed: {join}"))),
        Ok(Ok(result)) => result,
    };

    if let Err(e) = &outcome {
        match e {
            StoreError::Unavailable(_) | StoreError::Timeout(_) => {
                tracing::error!(operation, error = %e, "Storage dependency failure");
            }
            StoreError::Conflict(_) => {
                tracing::error!(operation, error = %e, "Unexpected uniqueness conflict");
            }
            StoreError::Internal(_) => {
                tracing::error!(operation, error = %e, "Internal storage failure");
            }
            StoreError::NotFound(_) | StoreError::InvalidInput(_) => {}
        }
    }

    outcome
}

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID database holding users and subscriptions.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("cannot create {}: {e}", parent.display())))?;
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_SUBJECTS)?;
            let _ = write_txn.open_table(SUBSCRIPTIONS_BY_USER)?;
            let _ = write_txn.open_table(SUBSCRIPTIONS_BY_SERIES)?;

            let mut meta = write_txn.open_table(SCHEMA_META)?;
            let stored = meta.get("schema_version")?.map(|v| v.value());
            match stored {
                None => {
                    meta.insert("schema_version", SCHEMA_VERSION)?;
                }
                Some(version) if version > SCHEMA_VERSION => {
                    return Err(StoreError::Internal(format!(
                        "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
                    )));
                }
                Some(_) => {}
            }
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), schema = SCHEMA_VERSION, "Database opened");
        Ok(Self { db })
    }

    pub(crate) fn inner(&self) -> &redb::Database {
        &self.db
    }

    /// Stored schema version.
    pub fn schema_version(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let meta = read_txn.open_table(SCHEMA_META)?;
        Ok(meta.get("schema_version")?.map(|v| v.value()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn open_records_schema_version() {
        let (db, _dir) = temp_db();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn reopen_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/users.redb");
        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.redb");
        {
            let db = Database::open(&path).unwrap();
            let txn = db.inner().begin_write().unwrap();
            {
                let mut meta = txn.open_table(SCHEMA_META).unwrap();
                meta.insert("schema_version", SCHEMA_VERSION + 1).unwrap();
            }
            txn.commit().unwrap();
        }
        assert!(matches!(Database::open(&path), Err(StoreError::Internal(_))));
    }

    #[test]
    fn composite_keys_group_by_prefix() {
        let (start, end) = prefix_bounds("user-1");
        let inside = pair_key("user-1", "series-z");
        let sibling = pair_key("user-10", "series-a");
        assert!(start.as_slice() <= inside.as_slice() && inside.as_slice() < end.as_slice());
        assert!(!(start.as_slice() <= sibling.as_slice() && sibling.as_slice() < end.as_slice()));
        assert_eq!(second_part(&inside).unwrap(), "series-z");
    }

    #[test]
    fn validate_id_rejects_unusable_ids() {
        assert!(validate_id("series_id", "s-1").is_ok());
        assert!(matches!(validate_id("series_id", ""), Err(StoreError::InvalidInput(_))));
        assert!(matches!(validate_id("series_id", "a\0b"), Err(StoreError::InvalidInput(_))));
        assert!(matches!(validate_id("series_id", " s1 "), Err(StoreError::InvalidInput(_))));
        assert!(matches!(validate_id("series_id", "s1\n"), Err(StoreError::InvalidInput(_))));
        assert!(validate_id("series_id", "rust 101").is_ok());
        let long = "x".repeat(MAX_ID_LEN + 1);
        assert!(matches!(validate_id("series_id", &long), Err(StoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn run_blocking_times_out() {
        let result = run_blocking("sleepy", Duration::from_millis(10), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;
        assert_eq!(result, Err(StoreError::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn run_blocking_contains_panics() {
        let result: StoreResult<()> =
            run_blocking("panicky", Duration::from_secs(1), || panic!("corrupt row")).await;
        assert!(matches!(result, Err(StoreError::Internal(_))));
    }
}
