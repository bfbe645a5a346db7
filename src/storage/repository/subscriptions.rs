// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription store: the user ↔ series relation.
//!
//! The relation lives in two tables, one per direction. Each operation touches
//! both inside one write transaction, and redb serializes write transactions,
//! so the tables never disagree and operations on one pair are linearizable.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{
    pair_key, prefix_bounds, run_blocking, second_part, validate_id, Database,
    SUBSCRIPTIONS_BY_SERIES, SUBSCRIPTIONS_BY_USER,
};
use crate::storage::{StoreError, StoreResult};

/// One row of the relation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Subscription {
    pub user_id: String,
    pub series_id: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of [`SubscriptionStore::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Added {
    Created(Subscription),
    Existing(Subscription),
}

impl Added {
    pub fn subscription(&self) -> &Subscription {
        match self {
            Added::Created(s) | Added::Existing(s) => s,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Added::Created(_))
    }
}

fn from_millis(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Internal(format!("stored timestamp {millis} is out of range")))
}

/// Second halves of every key in `table` whose first half is `first`.
fn scan_prefix(
    table: &impl ReadableTable<&'static [u8], i64>,
    first: &str,
) -> StoreResult<Vec<String>> {
    let (start, end) = prefix_bounds(first);
    let mut ids = Vec::new();
    for entry in table.range::<&[u8]>(start.as_slice()..end.as_slice())? {
        let (key, _) = entry?;
        ids.push(second_part(key.value())?);
    }
    Ok(ids)
}

/// Repository for the subscription relation.
#[derive(Clone)]
pub struct SubscriptionStore {
    db: Arc<Database>,
    timeout: Duration,
}

impl SubscriptionStore {
    pub fn new(db: Arc<Database>, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Subscribe `user_id` to `series_id`. Adding an existing pair returns the
    /// stored row unchanged.
    pub async fn add(&self, user_id: &str, series_id: &str) -> StoreResult<Added> {
        validate_id("user_id", user_id)?;
        validate_id("series_id", series_id)?;
        let db = self.db.clone();
        let user_id = user_id.to_string();
        let series_id = series_id.to_string();

        run_blocking("subscriptions.add", self.timeout, move || {
            let user_key = pair_key(&user_id, &series_id);
            let series_key = pair_key(&series_id, &user_id);

            let write_txn = db.inner().begin_write()?;
            let existing = {
                let by_user = write_txn.open_table(SUBSCRIPTIONS_BY_USER)?;
                let millis = by_user.get(user_key.as_slice())?.map(|v| v.value());
                millis
            };

            if let Some(millis) = existing {
                write_txn.abort()?;
                return Ok(Added::Existing(Subscription {
                    user_id,
                    series_id,
                    created_at: from_millis(millis)?,
                }));
            }

            let millis = Utc::now().timestamp_millis();
            {
                let mut by_user = write_txn.open_table(SUBSCRIPTIONS_BY_USER)?;
                let mut by_series = write_txn.open_table(SUBSCRIPTIONS_BY_SERIES)?;
                by_user.insert(user_key.as_slice(), millis)?;
                by_series.insert(series_key.as_slice(), millis)?;
            }
            write_txn.commit()?;

            Ok(Added::Created(Subscription {
                user_id,
                series_id,
                created_at: from_millis(millis)?,
            }))
        })
        .await
    }

    /// Unsubscribe. Returns whether a row was deleted; a missing pair is a no-op.
    pub async fn remove(&self, user_id: &str, series_id: &str) -> StoreResult<bool> {
        validate_id("user_id", user_id)?;
        validate_id("series_id", series_id)?;
        let db = self.db.clone();
        let user_id = user_id.to_string();
        let series_id = series_id.to_string();

        run_blocking("subscriptions.remove", self.timeout, move || {
            let write_txn = db.inner().begin_write()?;
            let removed = {
                let mut by_user = write_txn.open_table(SUBSCRIPTIONS_BY_USER)?;
                let mut by_series = write_txn.open_table(SUBSCRIPTIONS_BY_SERIES)?;
                let from_user = by_user
                    .remove(pair_key(&user_id, &series_id).as_slice())?
                    .is_some();
                let from_series = by_series
                    .remove(pair_key(&series_id, &user_id).as_slice())?
                    .is_some();
                if from_user != from_series {
                    return Err(StoreError::Internal(format!(
                        "subscription indexes disagree for ({user_id}, {series_id})"
                    )));
                }
                from_user
            };

            if removed {
                write_txn.commit()?;
            } else {
                write_txn.abort()?;
            }
            Ok(removed)
        })
        .await
    }

    /// Series ids `user_id` is subscribed to, in key order.
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<String>> {
        self.list("subscriptions.list_for_user", SUBSCRIPTIONS_BY_USER, "user_id", user_id)
            .await
    }

    /// User ids subscribed to `series_id`, in key order.
    pub async fn list_subscribers(&self, series_id: &str) -> StoreResult<Vec<String>> {
        self.list(
            "subscriptions.list_subscribers",
            SUBSCRIPTIONS_BY_SERIES,
            "series_id",
            series_id,
        )
        .await
    }

    /// Delete every subscription to `series_id`. Returns how many were removed.
    pub async fn remove_series(&self, series_id: &str) -> StoreResult<usize> {
        validate_id("series_id", series_id)?;
        let db = self.db.clone();
        let series_id = series_id.to_string();

        let removed = run_blocking("subscriptions.remove_series", self.timeout, move || {
            let write_txn = db.inner().begin_write()?;
            let user_ids = {
                let mut by_series = write_txn.open_table(SUBSCRIPTIONS_BY_SERIES)?;
                let mut by_user = write_txn.open_table(SUBSCRIPTIONS_BY_USER)?;
                let user_ids = scan_prefix(&by_series, &series_id)?;
                for user_id in &user_ids {
                    by_series.remove(pair_key(&series_id, user_id).as_slice())?;
                    by_user.remove(pair_key(user_id, &series_id).as_slice())?;
                }
                user_ids
            };

            if user_ids.is_empty() {
                write_txn.abort()?;
            } else {
                write_txn.commit()?;
            }
            Ok((series_id, user_ids.len()))
        })
        .await?;

        let (series_id, count) = removed;
        tracing::info!(series_id = %series_id, removed = count, "Series subscriptions removed");
        Ok(count)
    }

    async fn list(
        &self,
        operation: &'static str,
        table: TableDefinition<'static, &'static [u8], i64>,
        kind: &'static str,
        id: &str,
    ) -> StoreResult<Vec<String>> {
        validate_id(kind, id)?;
        let db = self.db.clone();
        let id = id.to_string();
        run_blocking(operation, self.timeout, move || {
            let read_txn = db.inner().begin_read()?;
            let table = read_txn.open_table(table)?;
            scan_prefix(&table, &id)
        })
        .await
    }
}
