// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The delivery worker loop.
//!
//! Each pass claims a batch of due items, then for every item: ask the rate
//! limiter, send through the provider under a timeout, and record the
//! outcome. Per-item delivery failures are recorded on the item and never
//! stop the loop. Storage failures end the pass; the loop logs them, pauses
//! and polls again.
//!
//! The claim is renewed when an item's turn comes, and every transition is
//! made under that renewed claim. An item the lease reaper handed to another
//! worker in the meantime is left alone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use innkeeper_config::model::QueueConfig;
use innkeeper_core::clock::after;
use innkeeper_core::{
    Claim, Clock, DeliveryError, InnkeeperError, MessageProvider, QueueItem, QueueStatus,
    QueueStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::rate_limiter::RateLimiter;

/// Tuning for a [`DeliveryWorker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum items claimed per pass.
    pub batch_size: usize,
    /// Sleep after a pass that claimed nothing.
    pub poll_interval: Duration,
    /// Bound on one provider send.
    pub send_timeout: Duration,
    /// How far a rate-limited item is pushed back.
    pub rate_limit_deferral: Duration,
    /// Sleep after a storage failure.
    pub store_error_pause: Duration,
    pub backoff: Backoff,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for WorkerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            poll_interval: config.poll_interval(),
            send_timeout: config.send_timeout(),
            rate_limit_deferral: config.rate_limit_deferral(),
            store_error_pause: config.store_error_pause(),
            backoff: Backoff::from(config),
        }
    }
}

/// What happened to one claimed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The provider accepted the message.
    Delivered,
    /// The rate limiter said no; the item waits until `until`.
    Deferred { until: DateTime<Utc> },
    /// The send failed and will be retried at `retry_at`.
    Retrying { retry_at: DateTime<Utc> },
    /// The item is now terminally `failed`.
    Failed,
    /// The claim expired and the item now belongs to someone else.
    Lost,
}

/// Claims due items and delivers them through a provider.
pub struct DeliveryWorker {
    id: usize,
    store: Arc<dyn QueueStore>,
    limiter: RateLimiter,
    provider: Arc<dyn MessageProvider>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn QueueStore>,
        limiter: RateLimiter,
        provider: Arc<dyn MessageProvider>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id: 0,
            store,
            limiter,
            provider,
            clock,
            config,
        }
    }

    /// Label used in logs when several workers share a process.
    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run until `cancel` fires.
    ///
    /// Cancellation is observed between items: the item being sent finishes,
    /// and claimed items not yet started go back to `pending`.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker_id = self.id, provider = self.provider.name(), "delivery worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let pause = match self.run_batch(&cancel).await {
                Ok(0) => Some(self.config.poll_interval),
                Ok(_) => None,
                Err(e) => {
                    error!(
                        worker_id = self.id,
                        error = %e,
                        pause_ms = self.config.store_error_pause.as_millis() as u64,
                        "delivery pass failed"
                    );
                    Some(self.config.store_error_pause)
                }
            };
            self.publish_stats().await;

            if let Some(pause) = pause {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!(worker_id = self.id, "delivery worker stopped");
    }

    /// Claim and process one batch. Returns how many items were claimed.
    pub async fn process_batch(&self) -> Result<usize, InnkeeperError> {
        self.run_batch(&CancellationToken::new()).await
    }

    async fn run_batch(&self, cancel: &CancellationToken) -> Result<usize, InnkeeperError> {
        let items = self
            .store
            .claim_next_batch(self.config.batch_size, self.clock.now())
            .await?;
        let claimed = items.len();
        if claimed > 0 {
            debug!(worker_id = self.id, claimed, "claimed batch");
        }

        let mut items = items.into_iter();
        while let Some(item) = items.next() {
            self.process_item(item).await?;
            if cancel.is_cancelled() {
                self.release(items).await;
                break;
            }
        }
        Ok(claimed)
    }

    /// Returns unstarted claims to `pending` on shutdown.
    async fn release(&self, items: impl Iterator<Item = QueueItem>) {
        let now = self.clock.now();
        for (item, claim) in items.filter_map(|item| item.claim().map(|claim| (item, claim))) {
            match self.store.defer(claim, now, now).await {
                Ok(()) => debug!(worker_id = self.id, item_id = item.id, "released claim on shutdown"),
                Err(InnkeeperError::ClaimLost { .. }) => {
                    debug!(worker_id = self.id, item_id = item.id, "claim already expired");
                }
                Err(e) => warn!(
                    worker_id = self.id,
                    item_id = item.id,
                    error = %e,
                    "could not release claim; the lease reaper will recover it"
                ),
            }
        }
    }

    /// Drive one claimed item through the delivery state machine.
    pub async fn process_item(&self, item: QueueItem) -> Result<ItemOutcome, InnkeeperError> {
        let now = self.clock.now();
        let Some(claim) = item.claim() else {
            warn!(worker_id = self.id, item_id = item.id, status = %item.status, "item is not claimed");
            return Ok(ItemOutcome::Lost);
        };
        let Some(claim) = self.held(&item, self.store.renew_claim(claim, now).await)? else {
            return Ok(ItemOutcome::Lost);
        };

        if !self.limiter.admit(&item.recipient, now).await? {
            let until = after(now, self.config.rate_limit_deferral);
            let Some(()) = self.held(&item, self.store.defer(claim, until, now).await)? else {
                return Ok(ItemOutcome::Lost);
            };
            innkeeper_prometheus::record_deferred();
            debug!(
                worker_id = self.id,
                item_id = item.id,
                recipient = %item.recipient,
                until = %until,
                "recipient rate limited, deferring"
            );
            return Ok(ItemOutcome::Deferred { until });
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.send_timeout,
            self.provider.send_message(&item.recipient, &item.payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.config.send_timeout)),
        };
        innkeeper_prometheus::record_send_latency(started.elapsed().as_secs_f64());

        let now = self.clock.now();
        match result {
            Ok(message_id) => {
                let Some(()) = self.held(&item, self.store.mark_completed(claim, now).await)? else {
                    return Ok(ItemOutcome::Lost);
                };
                innkeeper_prometheus::record_delivered();
                info!(
                    worker_id = self.id,
                    item_id = item.id,
                    recipient = %item.recipient,
                    attempt = item.attempt + 1,
                    message_id = %message_id,
                    "message delivered"
                );
                Ok(ItemOutcome::Delivered)
            }
            Err(e) if e.is_permanent() => {
                let failed = self
                    .store
                    .mark_permanently_failed(claim, &e.to_string(), now)
                    .await;
                let Some(()) = self.held(&item, failed)? else {
                    return Ok(ItemOutcome::Lost);
                };
                innkeeper_prometheus::record_failed("permanent");
                warn!(
                    worker_id = self.id,
                    item_id = item.id,
                    recipient = %item.recipient,
                    error = %e,
                    "permanent delivery failure"
                );
                Ok(ItemOutcome::Failed)
            }
            Err(e) => self.record_transient_failure(&item, claim, &e, now).await,
        }
    }

    /// Turns `ClaimLost` into `None`. The item's new holder owns its state.
    fn held<T>(
        &self,
        item: &QueueItem,
        result: Result<T, InnkeeperError>,
    ) -> Result<Option<T>, InnkeeperError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(InnkeeperError::ClaimLost { .. }) => {
                warn!(
                    worker_id = self.id,
                    item_id = item.id,
                    recipient = %item.recipient,
                    "claim expired, leaving item to its new holder"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn record_transient_failure(
        &self,
        item: &QueueItem,
        claim: Claim,
        error: &DeliveryError,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, InnkeeperError> {
        let attempt = item.attempt.saturating_add(1);
        let delay = self.config.backoff.delay(attempt);
        let recorded = self
            .store
            .mark_failed_attempt(claim, &error.to_string(), delay, now)
            .await;
        let Some(status) = self.held(item, recorded)? else {
            return Ok(ItemOutcome::Lost);
        };

        if status == QueueStatus::Pending {
            let retry_at = after(now, delay);
            innkeeper_prometheus::record_retried();
            warn!(
                worker_id = self.id,
                item_id = item.id,
                recipient = %item.recipient,
                attempt,
                max_retries = item.max_retries,
                retry_at = %retry_at,
                error = %error,
                "delivery failed, will retry"
            );
            Ok(ItemOutcome::Retrying { retry_at })
        } else {
            innkeeper_prometheus::record_failed("exhausted");
            error!(
                worker_id = self.id,
                item_id = item.id,
                recipient = %item.recipient,
                attempt,
                error = %error,
                "delivery failed, retries exhausted"
            );
            Ok(ItemOutcome::Failed)
        }
    }

    async fn publish_stats(&self) {
        match self.store.stats().await {
            Ok(stats) => innkeeper_prometheus::set_queue_stats(&stats),
            Err(e) => debug!(worker_id = self.id, error = %e, "could not refresh queue gauges"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaper::LeaseReaper;
    use innkeeper_core::{NewQueueItem, Priority};
    use innkeeper_test_utils::{MockProvider, Outcome, TestHarness};
    use serde_json::json;
    use std::collections::HashSet;

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    fn worker_for(harness: &TestHarness, provider: &MockProvider, limit: u32) -> DeliveryWorker {
        worker_with(
            harness,
            provider,
            limit,
            WorkerConfig {
                send_timeout: Duration::from_millis(50),
                ..WorkerConfig::default()
            },
        )
    }

    fn worker_with(
        harness: &TestHarness,
        provider: &MockProvider,
        limit: u32,
        config: WorkerConfig,
    ) -> DeliveryWorker {
        let limiter = RateLimiter::new(harness.storage.clone(), limit, Duration::from_secs(3600));
        DeliveryWorker::new(
            harness.storage.clone(),
            limiter,
            Arc::new(provider.clone()),
            harness.clock.clone(),
            config,
        )
    }

    async fn enqueue(harness: &TestHarness, recipient: &str, priority: Priority) -> i64 {
        harness
            .storage
            .insert(
                NewQueueItem::new(recipient, json!({"type": "text", "text": {"body": "hi"}}))
                    .with_priority(priority),
                harness.clock.now(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn success_marks_completed() {
        let harness = TestHarness::new().await.unwrap();
        let provider = MockProvider::new();
        let worker = worker_for(&harness, &provider, 80);
        let id = enqueue(&harness, "15550001111", Priority::Normal).await;

        assert_eq!(worker.process_batch().await.unwrap(), 1);

        let item = harness.item(id).await.unwrap();
        assert_eq!(item.status, QueueStatus::Completed);
        assert_eq!(provider.sent().await[0].recipient, "15550001111");
    }

    #[tokio::test]
    async fn sends_in_priority_order() {
        let harness = TestHarness::new().await.unwrap();
        let provider = MockProvider::new();
        let worker = worker_for(&harness, &provider, 80);

        enqueue(&harness, "low", Priority::Low).await;
        harness.advance(secs(1));
        enqueue(&harness, "high", Priority::High).await;
        harness.advance(secs(1));
        enqueue(&harness, "normal", Priority::Normal).await;

        worker.process_batch().await.unwrap();
        let order: Vec<String> = provider
            .sent()
            .await
            .into_iter()
            .map(|m| m.recipient)
            .collect();
        assert_eq!(order, vec!["high", "normal", "low"]);
    }

    #[tokio::test]
    async fn transient_failures_back_off_then_exhaust() {
        let harness = TestHarness::new().await.unwrap();
        let network = || Outcome::Fail(DeliveryError::Network("connection reset".into()));
        let provider = MockProvider::with_outcomes([network(), network(), network()]);
        let worker = worker_for(&harness, &provider, 80);
        let id = enqueue(&harness, "r", Priority::Normal).await;
        let t0 = harness.clock.now();

        let expected_delays = [2, 4, 8];
        let mut elapsed = 0;
        for (n, delay) in expected_delays.iter().enumerate() {
            let claimed = harness.storage.claim_next_batch(1, harness.clock.now()).await.unwrap();
            let outcome = worker.process_item(claimed[0].clone()).await.unwrap();
            let item = harness.item(id).await.unwrap();
            assert_eq!(item.attempt, n as u32 + 1);

            if n < 2 {
                assert_eq!(
                    outcome,
                    ItemOutcome::Retrying {
                        retry_at: t0 + secs(elapsed + delay)
                    }
                );
                assert_eq!(item.status, QueueStatus::Pending);
                assert_eq!(item.scheduled_at, t0 + secs(elapsed + delay));
                elapsed += delay;
                harness.advance(secs(*delay));
            } else {
                assert_eq!(outcome, ItemOutcome::Failed);
                assert_eq!(item.status, QueueStatus::Failed);
                assert_eq!(item.error.as_deref(), Some("network error: connection reset"));
            }
        }
    }

    #[tokio::test]
    async fn invalid_recipient_fails_on_first_attempt() {
        let harness = TestHarness::new().await.unwrap();
        let provider = MockProvider::with_outcomes([Outcome::Fail(
            DeliveryError::InvalidRecipient("not on WhatsApp".into()),
        )]);
        let worker = worker_for(&harness, &provider, 80);
        let id = enqueue(&harness, "r", Priority::Normal).await;

        worker.process_batch().await.unwrap();

        let item = harness.item(id).await.unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.attempt, 1);
    }

    #[tokio::test]
    async fn client_errors_are_permanent_but_throttling_retries() {
        let harness = TestHarness::new().await.unwrap();
        let provider = MockProvider::with_outcomes([
            Outcome::Fail(DeliveryError::Provider {
                status_code: 400,
                message: "bad payload".into(),
            }),
            Outcome::Fail(DeliveryError::Provider {
                status_code: 429,
                message: "slow down".into(),
            }),
        ]);
        let worker = worker_for(&harness, &provider, 80);
        let bad = enqueue(&harness, "a", Priority::High).await;
        let throttled = enqueue(&harness, "b", Priority::Normal).await;

        worker.process_batch().await.unwrap();

        assert_eq!(harness.item(bad).await.unwrap().status, QueueStatus::Failed);
        let throttled = harness.item(throttled).await.unwrap();
        assert_eq!(throttled.status, QueueStatus::Pending);
        assert_eq!(throttled.attempt, 1);
    }

    #[tokio::test]
    async fn timeout_is_a_transient_failure() {
        let harness = TestHarness::new().await.unwrap();
        let provider = MockProvider::with_outcomes([Outcome::Hang]);
        let worker = worker_for(&harness, &provider, 80);
        let id = enqueue(&harness, "r", Priority::Normal).await;

        worker.process_batch().await.unwrap();

        let item = harness.item(id).await.unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempt, 1);
        assert!(item.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn rate_limited_items_are_deferred_without_consuming_attempts() {
        let harness = TestHarness::new().await.unwrap();
        let provider = MockProvider::new();
        let worker = worker_for(&harness, &provider, 1);
        let first = enqueue(&harness, "guest", Priority::Normal).await;
        let second = enqueue(&harness, "guest", Priority::Normal).await;
        let now = harness.clock.now();

        worker.process_batch().await.unwrap();

        assert_eq!(harness.item(first).await.unwrap().status, QueueStatus::Completed);
        let deferred = harness.item(second).await.unwrap();
        assert_eq!(deferred.status, QueueStatus::Pending);
        assert_eq!(deferred.attempt, 0);
        assert_eq!(deferred.scheduled_at, now + secs(60));
        assert_eq!(provider.call_count().await, 1);
        assert!(logs_contain("recipient rate limited"));
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let harness = TestHarness::new().await.unwrap();
        let provider = MockProvider::new();
        let worker = Arc::new(worker_for(&harness, &provider, 80).with_id(3));
        let id = enqueue(&harness, "r", Priority::Normal).await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let worker = worker.clone();
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });

        for _ in 0..100 {
            if harness.item(id).await.unwrap().status == QueueStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker should stop promptly")
            .unwrap();
        assert_eq!(harness.item(id).await.unwrap().status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn stale_claim_is_skipped_without_sending() {
        let harness = TestHarness::new().await.unwrap();
        let provider = MockProvider::new();
        let worker = worker_for(&harness, &provider, 80);
        let reaper = LeaseReaper::new(
            harness.storage.clone(),
            harness.clock.clone(),
            Duration::from_secs(600),
            Duration::from_secs(60),
        );
        let id = enqueue(&harness, "guest", Priority::Normal).await;

        let stale = harness.storage.claim_next_batch(1, harness.clock.now()).await.unwrap();
        harness.advance(secs(700));
        assert_eq!(reaper.reap_once().await.unwrap(), 1);
        let taken = harness.storage.claim_next_batch(1, harness.clock.now()).await.unwrap();
        assert_eq!(taken[0].id, id);

        let outcome = worker.process_item(stale[0].clone()).await.unwrap();

        assert_eq!(outcome, ItemOutcome::Lost);
        assert_eq!(provider.call_count().await, 0);
        let item = harness.item(id).await.unwrap();
        assert_eq!(item.status, QueueStatus::Processing);
        assert_eq!(item.claim(), taken[0].claim());
        assert_eq!(item.attempt, 0);
    }

    #[tokio::test]
    async fn unclaimed_item_is_not_sent() {
        let harness = TestHarness::new().await.unwrap();
        let provider = MockProvider::new();
        let worker = worker_for(&harness, &provider, 80);
        let id = enqueue(&harness, "guest", Priority::Normal).await;

        let pending = harness.item(id).await.unwrap();
        assert_eq!(worker.process_item(pending).await.unwrap(), ItemOutcome::Lost);
        assert_eq!(provider.call_count().await, 0);
        assert_eq!(harness.item(id).await.unwrap().status, QueueStatus::Pending);
    }

    #[tokio::test]
    async fn slow_batch_under_reaping_never_sends_twice() {
        let harness = TestHarness::new().await.unwrap();
        let reaper = Arc::new(LeaseReaper::new(
            harness.storage.clone(),
            harness.clock.clone(),
            Duration::from_secs(300),
            Duration::from_secs(60),
        ));
        let rival_claims = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        // Every send takes 29 s of clock time. While it is in flight the
        // reaper sweeps and a rival worker grabs whatever was released.
        let provider = MockProvider::new().on_send({
            let storage = harness.storage.clone();
            let clock = harness.clock.clone();
            let reaper = reaper.clone();
            let rival_claims = rival_claims.clone();
            move |_| {
                let storage = storage.clone();
                let clock = clock.clone();
                let reaper = reaper.clone();
                let rival_claims = rival_claims.clone();
                async move {
                    clock.advance(secs(29));
                    reaper.reap_once().await.unwrap();
                    let taken = storage.claim_next_batch(20, clock.now()).await.unwrap();
                    rival_claims.lock().await.extend(taken);
                }
            }
        });
        let worker = worker_with(
            &harness,
            &provider,
            80,
            WorkerConfig {
                batch_size: 20,
                send_timeout: Duration::from_secs(30),
                ..WorkerConfig::default()
            },
        );
        for n in 0..20 {
            enqueue(&harness, &format!("guest-{n}"), Priority::Normal).await;
        }

        assert_eq!(worker.process_batch().await.unwrap(), 20);

        let rival_claims = rival_claims.lock().await.clone();
        assert!(!rival_claims.is_empty());
        let sent_by_first = provider.call_count().await;
        assert_eq!(sent_by_first + rival_claims.len(), 20);
        for item in &rival_claims {
            let stored = harness.item(item.id).await.unwrap();
            assert_eq!(stored.status, QueueStatus::Processing);
            assert_eq!(stored.claim(), item.claim());
        }

        let rival_provider = MockProvider::new();
        let rival = worker_for(&harness, &rival_provider, 80);
        for item in rival_claims {
            assert_eq!(rival.process_item(item).await.unwrap(), ItemOutcome::Delivered);
        }

        let mut recipients: Vec<String> = provider
            .sent()
            .await
            .into_iter()
            .map(|m| m.recipient)
            .collect();
        recipients.extend(rival_provider.sent().await.into_iter().map(|m| m.recipient));
        let unique: HashSet<&String> = recipients.iter().collect();
        assert_eq!(recipients.len(), 20);
        assert_eq!(unique.len(), 20);
        assert_eq!(harness.storage.stats().await.unwrap().completed, 20);
    }

    #[tokio::test]
    async fn cancel_mid_batch_returns_unstarted_items_untouched() {
        let harness = TestHarness::new().await.unwrap();
        let cancel = CancellationToken::new();
        let provider = MockProvider::new().on_send({
            let cancel = cancel.clone();
            move |_| {
                let cancel = cancel.clone();
                async move { cancel.cancel() }
            }
        });
        let worker = worker_for(&harness, &provider, 80);
        let first = enqueue(&harness, "a", Priority::High).await;
        let rest = [
            enqueue(&harness, "b", Priority::Normal).await,
            enqueue(&harness, "c", Priority::Low).await,
        ];

        tokio::time::timeout(Duration::from_secs(5), worker.run(cancel))
            .await
            .expect("worker should stop after the in-flight item");

        assert_eq!(provider.call_count().await, 1);
        assert_eq!(harness.item(first).await.unwrap().status, QueueStatus::Completed);
        for id in rest {
            let item = harness.item(id).await.unwrap();
            assert_eq!(item.status, QueueStatus::Pending);
            assert_eq!(item.attempt, 0);
            assert!(item.scheduled_at <= harness.clock.now());
        }
    }
}
