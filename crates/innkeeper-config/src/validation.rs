// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: non-zero intervals,
//! coherent backoff bounds, bindable addresses, complete WhatsApp credentials.

use crate::diagnostic::ConfigError;
use crate::model::InnkeeperConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &InnkeeperConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "agent.log_level `{}` must be one of {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    let queue = &config.queue;
    if queue.workers == 0 {
        errors.push(ConfigError::validation("queue.workers must be at least 1"));
    }
    if queue.batch_size == 0 {
        errors.push(ConfigError::validation("queue.batch_size must be at least 1"));
    }
    if queue.poll_interval_ms == 0 {
        errors.push(ConfigError::validation(
            "queue.poll_interval_ms must be greater than 0",
        ));
    }
    if queue.max_retries == 0 {
        errors.push(ConfigError::validation("queue.max_retries must be at least 1"));
    }
    if queue.backoff_base_ms == 0 {
        errors.push(ConfigError::validation(
            "queue.backoff_base_ms must be greater than 0",
        ));
    }
    if queue.backoff_max_ms < queue.backoff_base_ms {
        errors.push(ConfigError::validation(format!(
            "queue.backoff_max_ms ({}) must not be below queue.backoff_base_ms ({})",
            queue.backoff_max_ms, queue.backoff_base_ms
        )));
    }
    if queue.send_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "queue.send_timeout_secs must be greater than 0",
        ));
    }
    if queue.lease_timeout_secs > 0 && queue.lease_timeout_secs <= queue.send_timeout_secs {
        // A lease shorter than a send would let the reaper release live claims.
        errors.push(ConfigError::validation(format!(
            "queue.lease_timeout_secs ({}) must exceed queue.send_timeout_secs ({})",
            queue.lease_timeout_secs, queue.send_timeout_secs
        )));
    }
    let batch_budget = queue
        .send_timeout_secs
        .saturating_mul(u64::try_from(queue.batch_size).unwrap_or(u64::MAX));
    if queue.lease_timeout_secs > queue.send_timeout_secs
        && queue.lease_timeout_secs <= batch_budget
    {
        // Items wait their turn inside a claimed batch under the batch-wide lease.
        errors.push(ConfigError::validation(format!(
            "queue.lease_timeout_secs ({}) must exceed queue.batch_size * queue.send_timeout_secs ({})",
            queue.lease_timeout_secs, batch_budget
        )));
    }
    if queue.lease_timeout_secs > 0 && queue.reaper_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "queue.reaper_interval_secs must be greater than 0 when the reaper is enabled",
        ));
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ConfigError::validation(
            "rate_limit.window_secs must be greater than 0",
        ));
    }

    let whatsapp = &config.whatsapp;
    if whatsapp.access_token.is_some() && whatsapp.phone_number_id.is_none() {
        errors.push(ConfigError::validation(
            "whatsapp.phone_number_id is required when whatsapp.access_token is set",
        ));
    }
    if !whatsapp.api_base_url.starts_with("https://") && !whatsapp.api_base_url.starts_with("http://")
    {
        errors.push(ConfigError::validation(format!(
            "whatsapp.api_base_url `{}` must be an http(s) URL",
            whatsapp.api_base_url
        )));
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("gateway.host must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::validation(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
