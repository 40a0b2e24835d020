// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-recipient rolling-window rate limiting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use innkeeper_config::model::RateLimitConfig;
use innkeeper_core::{InnkeeperError, RateLimitStore, RateWindow};
use tracing::trace;

/// Admits at most `limit` sends per recipient per rolling window.
///
/// A window opens at the first admitted send and lasts `window`; a new one
/// opens only once it has fully elapsed. State lives in the store, so every
/// worker sharing the store shares the limit.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    limit: u32,
    window: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, limit: u32, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    pub fn from_config(store: Arc<dyn RateLimitStore>, config: &RateLimitConfig) -> Self {
        Self::new(store, config.max_messages, config.window())
    }

    /// Count one send against `recipient` if the window has room.
    ///
    /// Returns `false` without touching the window when the limit is reached.
    pub async fn admit(&self, recipient: &str, now: DateTime<Utc>) -> Result<bool, InnkeeperError> {
        let admitted = self
            .store
            .try_admit(recipient, now, self.limit, self.window)
            .await?;
        trace!(recipient, admitted, limit = self.limit, "rate limit check");
        Ok(admitted)
    }

    /// The stored window for `recipient`, if any.
    pub async fn window(&self, recipient: &str) -> Result<Option<RateWindow>, InnkeeperError> {
        self.store.rate_window(recipient).await
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_length(&self) -> Duration {
        self.window
    }
}
