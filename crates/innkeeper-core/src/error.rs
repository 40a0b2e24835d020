// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Innkeeper delivery pipeline.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across Innkeeper adapter traits and core operations.
#[derive(Debug, Error)]
pub enum InnkeeperError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed enqueue request. Returned synchronously, never persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Channel errors (webhook ingress, gateway binding).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Messaging provider setup errors (client construction, missing credentials).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// A transition was attempted on a queue item whose claim this worker no
    /// longer holds (the lease expired and the item was released or reclaimed).
    #[error("claim on queue item {id} is no longer held")]
    ClaimLost { id: i64 },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl InnkeeperError {
    /// Shorthand for a queue item that could not be found.
    pub fn queue_item_not_found(id: i64) -> Self {
        InnkeeperError::NotFound {
            entity: "queue item",
            id: id.to_string(),
        }
    }

    /// Returns true for failures of the persistence layer itself.
    pub fn is_storage(&self) -> bool {
        matches!(self, InnkeeperError::Storage { .. })
    }
}

/// Outcome of a failed provider send.
///
/// The delivery worker uses [`DeliveryError::is_permanent`] to decide between
/// the retry/backoff path and an immediate terminal failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Connection refused, reset, DNS failure and similar transport errors.
    #[error("network error: {0}")]
    Network(String),

    /// The send did not complete within the configured bound.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered with a non-success status.
    #[error("provider returned {status_code}: {message}")]
    Provider { status_code: u16, message: String },

    /// The recipient can never be reached. Retrying will not help.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}

impl DeliveryError {
    /// Whether the failure bypasses the retry budget.
    ///
    /// Invalid recipients and 4xx-class provider answers are permanent, except
    /// 408 (request timeout) and 429 (throttled), which clear up on their own.
    /// A 2xx answer the client could not read is permanent too: the provider
    /// has most likely accepted the message, and a retry would send it twice.
    pub fn is_permanent(&self) -> bool {
        match self {
            DeliveryError::InvalidRecipient(_) => true,
            DeliveryError::Provider { status_code, .. } => {
                (200..300).contains(status_code)
                    || ((400..500).contains(status_code)
                        && *status_code != 408
                        && *status_code != 429)
            }
            DeliveryError::Network(_) | DeliveryError::Timeout(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_recipient_is_permanent() {
        assert!(DeliveryError::InvalidRecipient("+1".into()).is_permanent());
    }

    #[test]
    fn transport_failures_are_transient() {
        assert!(!DeliveryError::Network("reset".into()).is_permanent());
        assert!(!DeliveryError::Timeout(Duration::from_secs(30)).is_permanent());
    }

    #[test]
    fn provider_status_classification() {
        let status = |code| DeliveryError::Provider {
            status_code: code,
            message: String::new(),
        };
        assert!(status(400).is_permanent());
        assert!(status(404).is_permanent());
        assert!(!status(408).is_permanent());
        assert!(!status(429).is_permanent());
        assert!(!status(500).is_permanent());
        assert!(!status(503).is_permanent());
    }

    #[test]
    fn unreadable_success_is_not_retried() {
        let accepted = DeliveryError::Provider {
            status_code: 200,
            message: "send response carried no message id".into(),
        };
        assert!(accepted.is_permanent());
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = InnkeeperError::queue_item_not_found(42);
        assert_eq!(err.to_string(), "queue item not found: 42");
        assert!(!err.is_storage());
    }
}
