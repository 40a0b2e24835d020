// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage traits for the durable message queue and rate-limit windows.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::InnkeeperError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Claim, NewQueueItem, QueueItem, QueueStats, QueueStatus, RateWindow};

/// Lifecycle of a persistence backend.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Opens the backend and applies migrations.
    async fn initialize(&self) -> Result<(), InnkeeperError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), InnkeeperError>;
}

/// Durable queue of outbound messages.
///
/// Every state transition is a single atomic statement against the backend,
/// so any number of workers, in one process or many, can share a store.
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Persists a new `pending` item and returns its id.
    ///
    /// Fails with [`InnkeeperError::Validation`] when the recipient is blank
    /// or the payload is `null`.
    async fn insert(&self, item: NewQueueItem, now: DateTime<Utc>) -> Result<i64, InnkeeperError>;

    async fn get(&self, id: i64) -> Result<Option<QueueItem>, InnkeeperError>;

    /// Claims up to `limit` due `pending` items, moving them to `processing`.
    ///
    /// Items come back ordered by priority (high first), then oldest first.
    /// No item is ever returned to two callers.
    async fn claim_next_batch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, InnkeeperError>;

    /// Extends the lease on a claimed item to `now`.
    ///
    /// Returns the renewed claim, or [`InnkeeperError::ClaimLost`] when the
    /// item was released or handed to another worker in the meantime.
    async fn renew_claim(&self, claim: Claim, now: DateTime<Utc>) -> Result<Claim, InnkeeperError>;

    // Every transition below applies only while `claim` is still the item's
    // current lease. Otherwise it fails with `ClaimLost` (or `NotFound`)
    // and changes nothing.

    async fn mark_completed(&self, claim: Claim, now: DateTime<Utc>) -> Result<(), InnkeeperError>;

    /// Records a failed send. Returns the status the item ended up in:
    /// `Pending` (rescheduled at `now + backoff`) or `Failed`.
    async fn mark_failed_attempt(
        &self,
        claim: Claim,
        error: &str,
        backoff: Duration,
        now: DateTime<Utc>,
    ) -> Result<QueueStatus, InnkeeperError>;

    /// Records a failed send that can never succeed, bypassing the retry budget.
    async fn mark_permanently_failed(
        &self,
        claim: Claim,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InnkeeperError>;

    /// Returns a claimed item to `pending` without consuming an attempt.
    async fn defer(
        &self,
        claim: Claim,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), InnkeeperError>;

    /// Returns `processing` items claimed before `claimed_before` to `pending`.
    async fn release_expired_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, InnkeeperError>;

    async fn stats(&self) -> Result<QueueStats, InnkeeperError>;
}

/// Durable per-recipient rate-limit windows.
#[async_trait]
pub trait RateLimitStore: Send + Sync + 'static {
    /// Atomically admits one send for `recipient` if its rolling window has room.
    ///
    /// Opens a fresh window `[now, now + window)` when none is active.
    /// A denied call leaves the stored window untouched.
    async fn try_admit(
        &self,
        recipient: &str,
        now: DateTime<Utc>,
        limit: u32,
        window: Duration,
    ) -> Result<bool, InnkeeperError>;

    async fn rate_window(&self, recipient: &str) -> Result<Option<RateWindow>, InnkeeperError>;
}
