// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging provider for deterministic testing.
//!
//! `MockProvider` implements `MessageProvider` with pre-configured outcomes,
//! so worker tests can drive every delivery path without a network.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use innkeeper_core::{
    AdapterType, DeliveryError, HealthStatus, InnkeeperError, MessageProvider, PluginAdapter,
    ProviderMessageId,
};

/// What the next `send_message` call does.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Accept the message.
    Deliver,
    /// Return this error.
    Fail(DeliveryError),
    /// Never answer; lets a caller's timeout fire.
    Hang,
}

/// A call the provider received.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipient: String,
    pub payload: serde_json::Value,
}

type SendHook = Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A mock provider that replays scripted outcomes.
///
/// Outcomes are popped from a FIFO queue. When the queue is empty every
/// call is delivered.
#[derive(Clone, Default)]
pub struct MockProvider {
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    on_send: Option<SendHook>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock provider pre-loaded with outcomes.
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            sent: Arc::default(),
            on_send: None,
        }
    }

    /// Run `hook` with the recipient inside every send, after the call is
    /// recorded and before the scripted outcome is returned.
    pub fn on_send<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: SendHook = Arc::new(
            move |recipient: String| -> Pin<Box<dyn Future<Output = ()> + Send>> {
                Box::pin(hook(recipient))
            },
        );
        self.on_send = Some(hook);
        self
    }

    /// Append an outcome to the script.
    pub async fn push_outcome(&self, outcome: Outcome) {
        self.outcomes.lock().await.push_back(outcome);
    }

    /// Every call received so far, including failed ones.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, InnkeeperError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), InnkeeperError> {
        Ok(())
    }
}

#[async_trait]
impl MessageProvider for MockProvider {
    async fn send_message(
        &self,
        recipient: &str,
        payload: &serde_json::Value,
    ) -> Result<ProviderMessageId, DeliveryError> {
        self.sent.lock().await.push(SentMessage {
            recipient: recipient.to_string(),
            payload: payload.clone(),
        });
        if let Some(hook) = self.on_send.clone() {
            hook(recipient.to_string()).await;
        }
        let outcome = self.outcomes.lock().await.pop_front();
        match outcome.unwrap_or(Outcome::Deliver) {
            Outcome::Deliver => Ok(ProviderMessageId(format!(
                "wamid.mock-{}",
                uuid::Uuid::new_v4()
            ))),
            Outcome::Fail(error) => Err(error),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replays_outcomes_then_delivers() {
        let provider = MockProvider::with_outcomes([Outcome::Fail(DeliveryError::Network(
            "reset".to_string(),
        ))]);

        let first = provider.send_message("1555", &json!({})).await;
        assert_eq!(first, Err(DeliveryError::Network("reset".to_string())));
        assert!(provider.send_message("1555", &json!({})).await.is_ok());
        assert_eq!(provider.call_count().await, 2);
    }

    #[tokio::test]
    async fn send_hook_runs_before_the_outcome() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = MockProvider::with_outcomes([Outcome::Fail(DeliveryError::Network(
            "reset".to_string(),
        ))])
        .on_send({
            let seen = seen.clone();
            move |recipient| {
                let seen = seen.clone();
                async move { seen.lock().await.push(recipient) }
            }
        });

        assert!(provider.send_message("1555", &json!({})).await.is_err());
        provider.clone().send_message("1666", &json!({})).await.unwrap();
        assert_eq!(*seen.lock().await, vec!["1555".to_string(), "1666".to_string()]);
    }

    #[tokio::test]
    async fn records_what_was_sent() {
        let provider = MockProvider::new();
        provider.send_message("1555", &json!({"text": "hi"})).await.unwrap();
        assert_eq!(
            provider.sent().await,
            vec![SentMessage {
                recipient: "1555".to_string(),
                payload: json!({"text": "hi"}),
            }]
        );
    }
}
