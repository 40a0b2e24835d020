// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `innkeeper serve` command implementation.
//!
//! Opens storage, starts the configured number of delivery workers, the
//! lease reaper and (optionally) the HTTP gateway, then waits for a
//! shutdown signal. On shutdown every task drains and the WAL is
//! checkpointed.

use std::sync::Arc;
use std::time::Duration;

use innkeeper_config::model::InnkeeperConfig;
use innkeeper_core::{InboundMessage, InnkeeperError, MessageContent, MessageProvider, StorageAdapter};
use innkeeper_queue::{Dispatcher, RateLimiter, WorkerConfig};
use innkeeper_storage::SqliteStorage;
use innkeeper_whatsapp::{PhoneNumberValidator, WhatsAppProvider};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::shutdown;

/// Runs the `innkeeper serve` command.
pub async fn run_serve(config: InnkeeperConfig) -> Result<(), InnkeeperError> {
    init_tracing(&config.agent.log_level);
    info!(name = config.agent.name.as_str(), "starting innkeeper serve");

    let storage = Arc::new(SqliteStorage::open(config.storage.clone()).await?);

    // Initialize Prometheus metrics (if enabled and compiled in).
    #[cfg(feature = "prometheus")]
    let prometheus_adapter = if config.prometheus.enabled {
        match innkeeper_prometheus::PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics enabled");
                Some(adapter)
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };

    let dispatcher = Arc::new(build_dispatcher(&config, storage.clone()));

    let provider: Arc<dyn MessageProvider> = Arc::new(
        WhatsAppProvider::from_config(&config.whatsapp, config.queue.send_timeout()).map_err(
            |e| {
                error!(error = %e, "failed to initialize WhatsApp provider");
                eprintln!(
                    "error: WhatsApp credentials required. Set whatsapp.access_token and \
                     whatsapp.phone_number_id in config or INNKEEPER_WHATSAPP_* env vars"
                );
                e
            },
        )?,
    );

    // Fail-closed: refuse to start the gateway with no auth configured.
    #[cfg(feature = "gateway")]
    {
        if config.gateway.enabled && config.gateway.bearer_token.is_none() {
            return Err(InnkeeperError::Config(
                "gateway enabled but gateway.bearer_token is not set".to_string(),
            ));
        }
    }

    let cancel = shutdown::install_signal_handler();
    let mut tasks = JoinSet::new();

    let worker_config = WorkerConfig::from(&config.queue);
    for id in 0..config.queue.workers {
        let worker = dispatcher
            .worker(provider.clone(), worker_config.clone())
            .with_id(id);
        let cancel = cancel.clone();
        tasks.spawn(async move { worker.run(cancel).await });
    }
    info!(
        workers = config.queue.workers,
        batch_size = config.queue.batch_size,
        "delivery workers started"
    );

    match config.queue.lease_timeout() {
        Some(lease) => {
            let reaper = dispatcher.reaper(lease, config.queue.reaper_interval());
            let cancel = cancel.clone();
            tasks.spawn(async move { reaper.run(cancel).await });
        }
        None => info!("lease reaper disabled (queue.lease_timeout_secs = 0)"),
    }

    {
        let cancel = cancel.clone();
        tasks.spawn(async move { memory_monitor(cancel).await });
    }

    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    {
        let cancel = cancel.clone();
        tasks.spawn(async move { log_inbound(inbound_rx, cancel).await });
    }

    #[cfg(feature = "gateway")]
    {
        if config.gateway.enabled {
            #[cfg(feature = "prometheus")]
            let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
                prometheus_adapter.as_ref().map(|adapter| {
                    let handle = adapter.handle().clone();
                    Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>
                });
            #[cfg(not(feature = "prometheus"))]
            let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> = None;

            let state = innkeeper_gateway::GatewayState {
                dispatcher: dispatcher.clone(),
                inbound_tx,
                auth: innkeeper_gateway::AuthConfig {
                    bearer_token: config.gateway.bearer_token.clone(),
                },
                webhook: innkeeper_gateway::WebhookConfig::from(&config.whatsapp),
                health: innkeeper_gateway::HealthState {
                    start_time: std::time::Instant::now(),
                    prometheus_render,
                },
            };
            let server_config = innkeeper_gateway::ServerConfig::from(&config.gateway);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                if let Err(e) =
                    innkeeper_gateway::start_server(&server_config, state, cancel.clone()).await
                {
                    error!(error = %e, "gateway server failed, shutting down");
                    cancel.cancel();
                }
            });
        } else {
            debug!("gateway disabled by configuration");
            drop(inbound_tx);
        }
    }
    #[cfg(not(feature = "gateway"))]
    drop(inbound_tx);

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "background task panicked");
            cancel.cancel();
        }
    }

    storage.close().await?;
    info!("innkeeper serve shutdown complete");
    Ok(())
}

/// Dispatcher wired to config: phone-number validation and the configured
/// retry budget and rate limit.
pub fn build_dispatcher(config: &InnkeeperConfig, storage: Arc<SqliteStorage>) -> Dispatcher {
    let limiter = RateLimiter::from_config(storage.clone(), &config.rate_limit);
    Dispatcher::new(storage, limiter)
        .with_validator(Arc::new(PhoneNumberValidator))
        .with_max_retries(config.queue.max_retries)
}

/// Logs guest messages from the webhook until the channel closes.
///
/// The conversational layer that answers them lives outside this process.
async fn log_inbound(mut rx: mpsc::Receiver<InboundMessage>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => {
                let Some(message) = message else { break };
                let kind = match &message.content {
                    MessageContent::Text(_) => "text",
                    MessageContent::Audio { .. } => "audio",
                    MessageContent::Unsupported(kind) => kind.as_str(),
                };
                info!(
                    message_id = %message.id,
                    sender = %message.sender,
                    kind,
                    "inbound guest message"
                );
            }
        }
    }
    debug!("inbound logger stopped");
}

/// Publishes jemalloc heap and resident sizes as gauges.
#[cfg(not(target_env = "msvc"))]
async fn memory_monitor(cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(15));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Stats are cached until the epoch advances.
                let _ = tikv_jemalloc_ctl::epoch::advance();
                let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
                let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);

                #[cfg(feature = "prometheus")]
                {
                    innkeeper_prometheus::set_memory_heap(allocated as f64);
                    innkeeper_prometheus::set_memory_resident(resident as f64);
                }
                #[cfg(not(feature = "prometheus"))]
                let _ = (allocated, resident);
            }
            _ = cancel.cancelled() => {
                debug!("memory monitor shutting down");
                break;
            }
        }
    }
}

#[cfg(target_env = "msvc")]
async fn memory_monitor(cancel: CancellationToken) {
    cancel.cancelled().await;
}

/// Installs the fmt subscriber. `RUST_LOG` overrides `agent.log_level`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "innkeeper={log_level},innkeeper_queue={log_level},innkeeper_storage={log_level},\
             innkeeper_whatsapp={log_level},innkeeper_gateway={log_level},tower_http=info,warn"
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use innkeeper_config::model::StorageConfig;
    use innkeeper_core::{Priority, QueueStatus, QueueStore};

    #[tokio::test]
    async fn dispatcher_uses_configured_validation_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = InnkeeperConfig::default();
        config.queue.max_retries = 5;
        config.storage = StorageConfig {
            database_path: dir.path().join("serve.db").to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };
        let storage = Arc::new(SqliteStorage::open(config.storage.clone()).await.unwrap());
        let dispatcher = build_dispatcher(&config, storage.clone());

        assert!(dispatcher
            .enqueue("reception", serde_json::json!({}), Priority::Normal)
            .await
            .is_err());

        let id = dispatcher
            .enqueue("+15550001111", serde_json::json!({"type": "text"}), Priority::Normal)
            .await
            .unwrap();
        let item = storage.get(id).await.unwrap().unwrap();
        assert_eq!(item.max_retries, 5);
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(dispatcher.rate_limiter().limit(), 80);
    }

    #[tokio::test]
    async fn inbound_logger_stops_on_cancel() {
        let (_tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), log_inbound(rx, cancel))
            .await
            .unwrap();
    }
}
