// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Innkeeper guest-messaging delivery pipeline.
//!
//! This crate provides the trait definitions, error types, and common types
//! shared by the storage, queue, provider, and gateway crates.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DeliveryError, InnkeeperError};
pub use types::{
    AdapterType, Claim, HealthStatus, InboundMessage, MessageContent, NewQueueItem, Priority,
    ProviderMessageId, QueueItem, QueueStats, QueueStatus, RateWindow,
};

pub use traits::provider::NonEmptyRecipient;
pub use traits::{
    MessageProvider, PluginAdapter, QueueStore, RateLimitStore, RecipientValidator,
    StorageAdapter,
};
