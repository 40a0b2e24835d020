// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot operator commands that share the serve process's database.

use std::sync::Arc;

use innkeeper_config::model::InnkeeperConfig;
use innkeeper_core::{InnkeeperError, Priority, StorageAdapter};
use innkeeper_storage::SqliteStorage;

use crate::serve::build_dispatcher;

/// Prints queue counts by status as pretty JSON.
pub async fn run_stats(config: &InnkeeperConfig) -> Result<(), InnkeeperError> {
    let storage = Arc::new(SqliteStorage::open(config.storage.clone()).await?);
    let stats = build_dispatcher(config, storage.clone()).stats().await?;
    let rendered = serde_json::to_string_pretty(&stats)
        .map_err(|e| InnkeeperError::Internal(format!("failed to render stats: {e}")))?;
    println!("{rendered}");
    storage.close().await
}

/// Enqueues a plain text message and prints the new item id.
pub async fn run_enqueue(
    config: &InnkeeperConfig,
    recipient: &str,
    text: &str,
    priority: Priority,
) -> Result<i64, InnkeeperError> {
    let storage = Arc::new(SqliteStorage::open(config.storage.clone()).await?);
    let id = build_dispatcher(config, storage.clone())
        .enqueue(recipient, text_payload(text), priority)
        .await?;
    println!("{id}");
    storage.close().await?;
    Ok(id)
}

/// WhatsApp Cloud API body for a text message, minus the addressing fields
/// the client adds at send time.
pub fn text_payload(text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "text",
        "text": { "body": text },
    })
}

/// Reports that the configuration loaded and validated.
pub fn run_config_check(config: &InnkeeperConfig) {
    println!(
        "config ok (agent.name={}, database={})",
        config.agent.name, config.storage.database_path
    );
}

/// Prints the effective configuration with secrets redacted.
pub fn run_config_show(config: &InnkeeperConfig) -> Result<(), InnkeeperError> {
    let rendered = innkeeper_config::to_redacted_toml(config)
        .map_err(|e| InnkeeperError::Config(format!("failed to render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use innkeeper_config::model::StorageConfig;
    use innkeeper_core::{QueueStatus, QueueStore};

    fn config_in(dir: &tempfile::TempDir) -> InnkeeperConfig {
        InnkeeperConfig {
            storage: StorageConfig {
                database_path: dir.path().join("cli.db").to_string_lossy().into_owned(),
                ..StorageConfig::default()
            },
            ..InnkeeperConfig::default()
        }
    }

    #[test]
    fn text_payload_wraps_body() {
        let payload = text_payload("Your room is ready");
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["text"]["body"], "Your room is ready");
    }

    #[tokio::test]
    async fn enqueue_persists_pending_item() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let id = run_enqueue(&config, "+15550001111", "Checkout is at 11", Priority::High)
            .await
            .unwrap();

        let storage = SqliteStorage::open(config.storage.clone()).await.unwrap();
        let item = storage.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.priority, Priority::High);
        assert_eq!(item.payload["text"]["body"], "Checkout is at 11");
        run_stats(&config).await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_rejects_non_phone_recipient() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let err = run_enqueue(&config, "front desk", "hello", Priority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, InnkeeperError::Validation(_)));
    }

    #[test]
    fn config_show_redacts_secrets() {
        let mut config = InnkeeperConfig::default();
        config.whatsapp.access_token = Some("EAAG-secret".into());
        assert!(run_config_show(&config).is_ok());
        let rendered = innkeeper_config::to_redacted_toml(&config).unwrap();
        assert!(!rendered.contains("EAAG-secret"));
    }
}
