// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging provider traits (WhatsApp Cloud API, test doubles).

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ProviderMessageId;

/// Performs the network send of one outbound message.
///
/// Implementations do not retry. Every failure is reported as a
/// [`DeliveryError`] and the delivery worker decides what happens next.
#[async_trait]
pub trait MessageProvider: PluginAdapter {
    async fn send_message(
        &self,
        recipient: &str,
        payload: &serde_json::Value,
    ) -> Result<ProviderMessageId, DeliveryError>;
}

/// Format check for recipient identifiers, applied before enqueue.
pub trait RecipientValidator: Send + Sync + 'static {
    /// Returns a human-readable reason when `recipient` is unusable.
    fn validate(&self, recipient: &str) -> Result<(), String>;
}

/// Accepts any non-blank recipient.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmptyRecipient;

impl RecipientValidator for NonEmptyRecipient {
    fn validate(&self, recipient: &str) -> Result<(), String> {
        if recipient.trim().is_empty() {
            Err("recipient must not be empty".to_string())
        } else {
            Ok(())
        }
    }
}
