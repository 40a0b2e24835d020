// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./innkeeper.toml` > `~/.config/innkeeper/innkeeper.toml`
//! > `/etc/innkeeper/innkeeper.toml`, with environment variable overrides via
//! the `INNKEEPER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::InnkeeperConfig;

/// Top-level config sections, used to map env var names onto dotted keys.
///
/// Longest names first so that `rate_limit_*` is never split at `rate_`.
const SECTIONS: &[&str] = &[
    "rate_limit",
    "prometheus",
    "whatsapp",
    "gateway",
    "storage",
    "agent",
    "queue",
];

pub const SYSTEM_CONFIG_PATH: &str = "/etc/innkeeper/innkeeper.toml";
pub const LOCAL_CONFIG_PATH: &str = "innkeeper.toml";

/// Path of the per-user config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("innkeeper/innkeeper.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/innkeeper/innkeeper.toml` (system-wide)
/// 3. `~/.config/innkeeper/innkeeper.toml` (user XDG config)
/// 4. `./innkeeper.toml` (local directory)
/// 5. `INNKEEPER_*` environment variables
pub fn load_config() -> Result<InnkeeperConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<InnkeeperConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(InnkeeperConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<InnkeeperConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(InnkeeperConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment without extracting it.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(InnkeeperConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Environment provider mapping `INNKEEPER_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Only the section prefix is split, never the key, so
/// `INNKEEPER_WHATSAPP_ACCESS_TOKEN` becomes `whatsapp.access_token`.
fn env_provider() -> Env {
    Env::prefixed("INNKEEPER_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name onto a dotted config key.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_only_at_section() {
        assert_eq!(map_env_key("whatsapp_access_token"), "whatsapp.access_token");
        assert_eq!(map_env_key("rate_limit_max_messages"), "rate_limit.max_messages");
        assert_eq!(map_env_key("queue_send_timeout_secs"), "queue.send_timeout_secs");
        assert_eq!(map_env_key("agent_log_level"), "agent.log_level");
    }

    #[test]
    fn unknown_section_is_left_alone() {
        assert_eq!(map_env_key("something_else"), "something_else");
    }
}
