// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API integration for Innkeeper.
//!
//! [`WhatsAppProvider`] implements [`MessageProvider`] on top of the
//! Graph API messages endpoint. [`PhoneNumberValidator`] checks recipients
//! at enqueue time, and [`webhook`] verifies and parses inbound
//! notifications.

pub mod client;
pub mod types;
pub mod validator;
pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use innkeeper_config::model::WhatsAppConfig;
use innkeeper_core::{
    AdapterType, DeliveryError, HealthStatus, InnkeeperError, MessageProvider, PluginAdapter,
    ProviderMessageId,
};
use tracing::info;

pub use client::WhatsAppClient;
pub use validator::PhoneNumberValidator;

/// Outbound WhatsApp provider.
#[derive(Debug, Clone)]
pub struct WhatsAppProvider {
    client: WhatsAppClient,
}

impl WhatsAppProvider {
    /// Builds the provider from config. Requires `access_token` and
    /// `phone_number_id`.
    pub fn from_config(config: &WhatsAppConfig, timeout: Duration) -> Result<Self, InnkeeperError> {
        let access_token = config.access_token.as_deref().ok_or_else(|| {
            InnkeeperError::Config("whatsapp.access_token is not set".to_string())
        })?;
        let phone_number_id = config.phone_number_id.as_deref().ok_or_else(|| {
            InnkeeperError::Config("whatsapp.phone_number_id is not set".to_string())
        })?;

        let client = WhatsAppClient::new(
            access_token,
            phone_number_id,
            &config.api_base_url,
            &config.api_version,
            timeout,
        )?;
        info!(url = client.messages_url(), "WhatsApp provider initialized");
        Ok(Self { client })
    }

    pub fn with_client(client: WhatsAppClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginAdapter for WhatsAppProvider {
    fn name(&self) -> &str {
        "whatsapp"
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
impl MessageProvider for WhatsAppProvider {
    async fn send_message(
        &self,
        recipient: &str,
        payload: &serde_json::Value,
    ) -> Result<ProviderMessageId, DeliveryError> {
        self.client.send(recipient, payload).await
    }
}
