// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer-facing facade over the queue.

use std::sync::Arc;
use std::time::Duration;

use innkeeper_core::clock::{after, horizon};
use innkeeper_core::types::DEFAULT_MAX_RETRIES;
use innkeeper_core::{
    Clock, InnkeeperError, MessageProvider, NewQueueItem, NonEmptyRecipient, Priority,
    QueueStats, QueueStore, RecipientValidator, SystemClock,
};
use tracing::{debug, info};

use crate::rate_limiter::RateLimiter;
use crate::reaper::LeaseReaper;
use crate::worker::{DeliveryWorker, WorkerConfig};

/// An enqueue request with optional overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueRequest {
    pub recipient: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    /// Overrides the dispatcher's retry budget for this item.
    pub max_retries: Option<u32>,
    /// Hold the item back this long before it becomes claimable.
    pub delay: Option<Duration>,
}

impl EnqueueRequest {
    pub fn new(recipient: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            recipient: recipient.into(),
            payload,
            priority: Priority::default(),
            max_retries: None,
            delay: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Validates and persists outbound messages, and builds the workers that
/// drain them.
///
/// Enqueueing never waits on delivery. Once `enqueue` returns an id the
/// message is durable; its fate is visible only through [`stats`](Self::stats)
/// and the item row.
pub struct Dispatcher {
    store: Arc<dyn QueueStore>,
    limiter: RateLimiter,
    validator: Arc<dyn RecipientValidator>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn QueueStore>, limiter: RateLimiter) -> Self {
        Self {
            store,
            limiter,
            validator: Arc::new(NonEmptyRecipient),
            clock: Arc::new(SystemClock),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn RecipientValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Default retry budget for items enqueued without an override.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enqueue with default retry budget and no delay.
    pub async fn enqueue(
        &self,
        recipient: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<i64, InnkeeperError> {
        self.enqueue_with(EnqueueRequest::new(recipient, payload).priority(priority))
            .await
    }

    pub async fn enqueue_with(&self, request: EnqueueRequest) -> Result<i64, InnkeeperError> {
        self.validator
            .validate(&request.recipient)
            .map_err(|reason| {
                InnkeeperError::Validation(format!(
                    "invalid recipient {:?}: {reason}",
                    request.recipient
                ))
            })?;
        if request.payload.is_null() {
            return Err(InnkeeperError::Validation(
                "payload must not be null".to_string(),
            ));
        }
        let max_retries = request.max_retries.unwrap_or(self.max_retries);
        if max_retries == 0 {
            return Err(InnkeeperError::Validation(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut item = NewQueueItem::new(request.recipient.clone(), request.payload)
            .with_priority(request.priority)
            .with_max_retries(max_retries);
        if let Some(delay) = request.delay {
            let not_before = after(now, delay);
            if not_before >= horizon() {
                return Err(InnkeeperError::Validation(format!(
                    "delay of {}s reaches past the year 9999",
                    delay.as_secs()
                )));
            }
            item = item.not_before(not_before);
        }

        let id = self.store.insert(item, now).await?;
        innkeeper_prometheus::record_enqueued(&request.priority.to_string());
        info!(
            item_id = id,
            recipient = %request.recipient,
            priority = %request.priority,
            "message enqueued"
        );
        Ok(id)
    }

    pub async fn stats(&self) -> Result<QueueStats, InnkeeperError> {
        self.store.stats().await
    }

    /// A worker sharing this dispatcher's store, rate limiter and clock.
    pub fn worker(&self, provider: Arc<dyn MessageProvider>, config: WorkerConfig) -> DeliveryWorker {
        debug!(provider = provider.name(), "building delivery worker");
        DeliveryWorker::new(
            self.store.clone(),
            self.limiter.clone(),
            provider,
            self.clock.clone(),
            config,
        )
    }

    pub fn reaper(&self, lease: Duration, interval: Duration) -> LeaseReaper {
        LeaseReaper::new(self.store.clone(), self.clock.clone(), lease, interval)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn store(&self) -> Arc<dyn QueueStore> {
        self.store.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use innkeeper_core::QueueStatus;
    use innkeeper_test_utils::TestHarness;
    use serde_json::json;

    struct DigitsOnly;

    impl RecipientValidator for DigitsOnly {
        fn validate(&self, recipient: &str) -> Result<(), String> {
            if recipient.chars().all(|c| c.is_ascii_digit()) {
                Ok(())
            } else {
                Err("digits only".to_string())
            }
        }
    }

    fn dispatcher_for(harness: &TestHarness) -> Dispatcher {
        let limiter = RateLimiter::new(harness.storage.clone(), 80, Duration::from_secs(3600));
        Dispatcher::new(harness.storage.clone(), limiter)
            .with_validator(Arc::new(DigitsOnly))
            .with_clock(harness.clock.clone())
    }

    #[tokio::test]
    async fn enqueue_persists_a_pending_item() {
        let harness = TestHarness::new().await.unwrap();
        let dispatcher = dispatcher_for(&harness);

        let id = dispatcher
            .enqueue("15550001111", json!({"type": "text"}), Priority::High)
            .await
            .unwrap();

        let item = harness.item(id).await.unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.priority, Priority::High);
        assert_eq!(item.attempt, 0);
        assert_eq!(item.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(item.scheduled_at, TestHarness::epoch());
    }

    #[tokio::test]
    async fn validator_rejection_is_not_persisted() {
        let harness = TestHarness::new().await.unwrap();
        let dispatcher = dispatcher_for(&harness);

        let err = dispatcher
            .enqueue("call me", json!({}), Priority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, InnkeeperError::Validation(ref m) if m.contains("digits only")));
        assert_eq!(dispatcher.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn null_payload_and_zero_retries_are_rejected() {
        let harness = TestHarness::new().await.unwrap();
        let dispatcher = dispatcher_for(&harness);

        assert!(matches!(
            dispatcher.enqueue("1555", serde_json::Value::Null, Priority::Low).await,
            Err(InnkeeperError::Validation(_))
        ));
        assert!(matches!(
            dispatcher
                .enqueue_with(EnqueueRequest::new("1555", json!({})).max_retries(0))
                .await,
            Err(InnkeeperError::Validation(_))
        ));
        assert_eq!(dispatcher.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn enqueue_with_applies_overrides() {
        let harness = TestHarness::new().await.unwrap();
        let dispatcher = dispatcher_for(&harness).with_max_retries(5);

        let defaulted = dispatcher
            .enqueue("1555", json!({}), Priority::Normal)
            .await
            .unwrap();
        let delayed = dispatcher
            .enqueue_with(
                EnqueueRequest::new("1555", json!({}))
                    .priority(Priority::Low)
                    .max_retries(1)
                    .delay(Duration::from_secs(90)),
            )
            .await
            .unwrap();

        assert_eq!(harness.item(defaulted).await.unwrap().max_retries, 5);
        let delayed = harness.item(delayed).await.unwrap();
        assert_eq!(delayed.max_retries, 1);
        assert_eq!(delayed.priority, Priority::Low);
        assert_eq!(
            delayed.scheduled_at,
            TestHarness::epoch() + chrono::Duration::seconds(90)
        );
    }

    #[tokio::test]
    async fn delay_past_the_storable_range_is_rejected() {
        let harness = TestHarness::new().await.unwrap();
        let dispatcher = dispatcher_for(&harness);
        let ten_thousand_years = Duration::from_secs(10_000 * 365 * 24 * 3600);

        let err = dispatcher
            .enqueue_with(EnqueueRequest::new("1555", json!({})).delay(ten_thousand_years))
            .await
            .unwrap_err();
        assert!(matches!(err, InnkeeperError::Validation(ref m) if m.contains("9999")));
        assert!(matches!(
            dispatcher
                .enqueue_with(EnqueueRequest::new("1555", json!({})).delay(Duration::MAX))
                .await,
            Err(InnkeeperError::Validation(_))
        ));
        assert_eq!(dispatcher.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn stats_count_every_insert() {
        let harness = TestHarness::new().await.unwrap();
        let dispatcher = dispatcher_for(&harness);
        for n in 0..7 {
            dispatcher
                .enqueue("1555", json!({"n": n}), Priority::Normal)
                .await
                .unwrap();
        }
        let stats = dispatcher.stats().await.unwrap();
        assert_eq!(stats.pending, 7);
        assert_eq!(stats.total(), 7);
    }
}
