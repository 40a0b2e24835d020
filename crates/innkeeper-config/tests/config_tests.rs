// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Innkeeper configuration system.

use std::io::Write;

use innkeeper_config::diagnostic::ConfigError;
use innkeeper_config::model::InnkeeperConfig;
use innkeeper_config::{
    load_and_validate_path, load_and_validate_str, load_config_from_str, to_redacted_toml,
};
use serial_test::serial;

#[test]
fn full_toml_deserializes_into_config() {
    let toml = r#"
[agent]
name = "front-desk"
log_level = "debug"

[storage]
database_path = "/tmp/innkeeper-test.db"
wal_mode = false

[queue]
workers = 2
batch_size = 25
max_retries = 5
backoff_base_ms = 500
send_timeout_secs = 10
lease_timeout_secs = 120

[rate_limit]
max_messages = 20
window_secs = 600

[whatsapp]
access_token = "EAAG-test"
phone_number_id = "1234567890"
verify_token = "hello"

[gateway]
enabled = true
port = 8080
bearer_token = "secret"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "front-desk");
    assert_eq!(config.storage.database_path, "/tmp/innkeeper-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.queue.workers, 2);
    assert_eq!(config.queue.batch_size, 25);
    assert_eq!(config.queue.max_retries, 5);
    assert_eq!(config.queue.backoff_base().as_millis(), 500);
    assert_eq!(config.queue.lease_timeout().map(|d| d.as_secs()), Some(120));
    assert_eq!(config.rate_limit.max_messages, 20);
    assert_eq!(config.rate_limit.window().as_secs(), 600);
    assert_eq!(config.whatsapp.phone_number_id.as_deref(), Some("1234567890"));
    assert!(config.gateway.enabled);
    assert_eq!(config.gateway.port, 8080);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    let defaults = InnkeeperConfig::default();
    assert_eq!(config.queue.batch_size, defaults.queue.batch_size);
    assert_eq!(config.rate_limit.max_messages, 80);
    assert_eq!(config.rate_limit.window_secs, 3600);
    assert_eq!(config.queue.max_retries, 3);
    assert_eq!(config.whatsapp.api_base_url, "https://graph.facebook.com");
    assert!(!config.gateway.enabled);
}

#[test]
fn unknown_field_gets_suggestion() {
    let toml = r#"
[queue]
max_retires = 4
"#;
    let errors = load_and_validate_str(toml).expect_err("typo must be rejected");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey { key, suggestion, .. } if key == "max_retires" => {
            suggestion.clone()
        }
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("max_retries"));
}

#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[telegram]
bot_token = "abc"
"#;
    assert!(load_and_validate_str(toml).is_err());
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[rate_limit]
max_messages = "many"
"#;
    let errors = load_and_validate_str(toml).expect_err("string for u32 must fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_))),
        "got: {errors:?}"
    );
}

#[test]
fn semantic_errors_surface_from_validation() {
    let toml = r#"
[queue]
backoff_base_ms = 5000
backoff_max_ms = 1000
"#;
    let errors = load_and_validate_str(toml).expect_err("max below base must fail");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::Validation { .. })));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("innkeeper.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[rate_limit]\nmax_messages = 10").unwrap();

    // SAFETY: serialized test, no other thread reads the environment.
    unsafe {
        std::env::set_var("INNKEEPER_RATE_LIMIT_MAX_MESSAGES", "42");
        std::env::set_var("INNKEEPER_WHATSAPP_API_VERSION", "v22.0");
    }
    let result = load_and_validate_path(&path);
    unsafe {
        std::env::remove_var("INNKEEPER_RATE_LIMIT_MAX_MESSAGES");
        std::env::remove_var("INNKEEPER_WHATSAPP_API_VERSION");
    }

    let config = result.expect("config with env overrides should load");
    assert_eq!(config.rate_limit.max_messages, 42);
    assert_eq!(config.whatsapp.api_version, "v22.0");
}

#[test]
fn redacted_toml_hides_secrets_and_reloads() {
    let mut config = InnkeeperConfig::default();
    config.whatsapp.access_token = Some("EAAG-very-secret".to_string());
    config.whatsapp.phone_number_id = Some("42".to_string());
    config.gateway.bearer_token = Some("tok".to_string());

    let rendered = to_redacted_toml(&config).unwrap();
    assert!(!rendered.contains("EAAG-very-secret"));
    assert!(!rendered.contains("\"tok\""));
    assert!(rendered.contains("<redacted>"));

    let reloaded = load_config_from_str(&rendered).unwrap();
    assert_eq!(reloaded.whatsapp.phone_number_id.as_deref(), Some("42"));
}
