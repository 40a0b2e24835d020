// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery pipeline for Innkeeper.
//!
//! The [`Dispatcher`] is the producer-facing facade: it validates and
//! persists messages. [`DeliveryWorker`] loops claim due items in priority
//! order, ask the [`RateLimiter`] for admission, send through a
//! [`MessageProvider`](innkeeper_core::MessageProvider) and record the
//! outcome. [`LeaseReaper`] returns items orphaned by a dead worker.
//!
//! All coordination between workers happens through the store's atomic
//! claim, so any number of workers may share one store.

pub mod backoff;
pub mod dispatcher;
pub mod rate_limiter;
pub mod reaper;
pub mod worker;

pub use backoff::Backoff;
pub use dispatcher::{Dispatcher, EnqueueRequest};
pub use rate_limiter::RateLimiter;
pub use reaper::LeaseReaper;
pub use worker::{DeliveryWorker, ItemOutcome, WorkerConfig};
