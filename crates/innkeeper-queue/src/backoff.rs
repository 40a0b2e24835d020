// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential retry delays.

use std::time::Duration;

use innkeeper_config::model::QueueConfig;

/// `delay(n) = base * 2^n`, optionally capped.
///
/// `n` is the attempt count after the failure being scheduled, so with a
/// one-second base the first three retries wait 2 s, 4 s and 8 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Option<Duration>,
}

impl Backoff {
    pub const fn new(base: Duration) -> Self {
        Self { base, max: None }
    }

    pub const fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay before the retry that follows attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = 1u32
            .checked_shl(attempt)
            .map_or(Duration::MAX, |factor| self.base.saturating_mul(factor));
        match self.max {
            Some(max) => raw.min(max),
            None => raw,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl From<&QueueConfig> for Backoff {
    fn from(config: &QueueConfig) -> Self {
        Self::new(config.backoff_base()).with_max(config.backoff_max())
    }
}
