// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Set Refresher
//!
//! Background task that refreshes the signing key set ahead of its TTL, so
//! request-path lookups rarely pay for a fetch. Lookups still refresh on their
//! own when a key id is unknown or the snapshot has expired; this task only
//! keeps the common case warm.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::KeySetCache;

/// Background key set refresher.
pub struct KeyRefresher {
    keys: Arc<KeySetCache>,
    interval: Duration,
}

impl KeyRefresher {
    /// Refresh every half TTL, but no more than once a second.
    pub fn new(keys: Arc<KeySetCache>, ttl: Duration) -> Self {
        Self {
            keys,
            interval: (ttl / 2).max(Duration::from_secs(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the refresh loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(refresher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Key set refresher starting"
        );

        loop {
            // Failures are logged by the cache; the next tick retries.
            if let Ok(count) = self.keys.refresh().await {
                debug!(keys = count, "Background key set refresh done");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Key set refresher shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::UnreachableFetcher;

    #[test]
    fn interval_is_half_ttl_with_floor() {
        let keys = Arc::new(KeySetCache::new(Arc::new(UnreachableFetcher)));
        assert_eq!(
            KeyRefresher::new(keys.clone(), Duration::from_secs(300)).interval(),
            Duration::from_secs(150)
        );
        assert_eq!(
            KeyRefresher::new(keys, Duration::ZERO).interval(),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn stops_on_cancellation() {
        let keys = Arc::new(KeySetCache::new(Arc::new(UnreachableFetcher)));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(KeyRefresher::new(keys, Duration::from_secs(60)).run(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher should stop promptly")
            .unwrap();
    }
}
