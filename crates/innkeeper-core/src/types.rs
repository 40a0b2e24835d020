// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the queue, storage, provider, and gateway crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default ceiling on send attempts for a queued message.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Provider,
    Storage,
    Observability,
}

/// Claim-order tier of a queued message. `Low < Normal < High`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Integer rank stored in the `priority` column; higher claims first.
    pub fn rank(self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }

    /// Inverse of [`Priority::rank`].
    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            0 => Some(Priority::Low),
            1 => Some(Priority::Normal),
            2 => Some(Priority::High),
            _ => None,
        }
    }
}

/// Lifecycle state of a queued message.
///
/// `Pending -> Processing -> {Completed | Pending (retry) | Failed}`.
/// `Completed` and `Failed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// A unit of outbound work as persisted in the `message_queue` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub recipient: String,
    /// Provider-specific body, opaque to the queue.
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub status: QueueStatus,
    /// Send attempts made so far.
    pub attempt: u32,
    pub max_retries: u32,
    /// The item is not claimed before this instant.
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Most recent claim, used for lease expiry.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Last failure message.
    pub error: Option<String>,
}

impl QueueItem {
    /// The lease this item was handed out under, if it is claimed.
    pub fn claim(&self) -> Option<Claim> {
        match (self.status, self.claimed_at) {
            (QueueStatus::Processing, Some(leased_at)) => Some(Claim {
                id: self.id,
                leased_at,
            }),
            _ => None,
        }
    }
}

/// Ownership of a `processing` item.
///
/// `leased_at` is the `claimed_at` stamp written when the item was claimed
/// or its lease last renewed. Transitions only apply while the stored stamp
/// still matches, so a worker whose lease expired cannot overwrite the state
/// written by the item's next holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub id: i64,
    pub leased_at: DateTime<Utc>,
}

/// Insert request for the queue store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueItem {
    pub recipient: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub max_retries: u32,
    /// First eligible claim time. `None` means immediately.
    pub not_before: Option<DateTime<Utc>>,
}

impl NewQueueItem {
    pub fn new(recipient: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            recipient: recipient.into(),
            payload,
            priority: Priority::Normal,
            max_retries: DEFAULT_MAX_RETRIES,
            not_before: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }
}

/// Per-status item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn get(&self, status: QueueStatus) -> u64 {
        match status {
            QueueStatus::Pending => self.pending,
            QueueStatus::Processing => self.processing,
            QueueStatus::Completed => self.completed,
            QueueStatus::Failed => self.failed,
        }
    }
}

/// Per-recipient send counter for one rolling window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub recipient: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub message_count: u32,
}

impl RateWindow {
    /// A window covers `[window_start, window_end)`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.window_end
    }
}

/// Identifier the messaging provider assigns to an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderMessageId(pub String);

impl std::fmt::Display for ProviderMessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content of an inbound guest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// A voice note; the media must be fetched from the provider by id.
    Audio { media_id: String, mime_type: String },
    /// Any message type the bot does not handle, by type name.
    Unsupported(String),
}

/// An inbound message received through the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Provider message id.
    pub id: String,
    /// Sender phone number, usable as a queue recipient.
    pub sender: String,
    /// Sender display name, if the provider supplied one.
    pub sender_name: Option<String>,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}
