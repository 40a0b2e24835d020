// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recovery of claims orphaned by a worker that died mid-send.

use std::sync::Arc;
use std::time::Duration;

use innkeeper_core::clock::before;
use innkeeper_core::{Clock, InnkeeperError, QueueStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodically returns `processing` items whose claim is older than the
/// lease to `pending`.
///
/// Workers renew a claim when the item's turn in the batch comes, so the
/// lease must exceed one send. Validation further requires it to exceed a
/// whole batch of sends, so waiting items are not released under a live
/// worker.
pub struct LeaseReaper {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    lease: Duration,
    interval: Duration,
}

impl LeaseReaper {
    pub fn new(
        store: Arc<dyn QueueStore>,
        clock: Arc<dyn Clock>,
        lease: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            lease,
            interval,
        }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// One sweep. Returns how many claims were released.
    pub async fn reap_once(&self) -> Result<u64, InnkeeperError> {
        let now = self.clock.now();
        let cutoff = before(now, self.lease);
        let released = self.store.release_expired_claims(cutoff, now).await?;
        if released > 0 {
            innkeeper_prometheus::record_claims_released(released);
            warn!(released, cutoff = %cutoff, "released expired claims");
        } else {
            debug!("no expired claims");
        }
        Ok(released)
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            lease_secs = self.lease.as_secs(),
            interval_secs = self.interval.as_secs(),
            "lease reaper started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.reap_once().await {
                        warn!(error = %e, "lease sweep failed");
                    }
                }
            }
        }
        info!("lease reaper stopped");
    }
}
