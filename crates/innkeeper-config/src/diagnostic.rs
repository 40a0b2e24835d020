// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration errors as miette diagnostics.
//!
//! Figment failures are converted here. An unknown key is pointed at in the
//! TOML file it came from, with the closest valid key offered as a fix.
//! Semantic checks from [`crate::validation`] use the same type so the CLI
//! prints a single list.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a suggestion, e.g. `max_retires` -> `max_retries`.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key the config model does not have.
    #[error("unknown key `{key}` in {table}")]
    #[diagnostic(
        code(innkeeper::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// `[queue]`-style name of the enclosing table.
        table: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a setting here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value of the wrong shape, e.g. a string for `rate_limit.max_messages`.
    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(innkeeper::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
    },

    /// A value that parsed but cannot be run with.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(innkeeper::config::validation))]
    Validation { message: String },

    /// Anything else Figment reports, such as malformed TOML.
    #[error("configuration error: {0}")]
    #[diagnostic(code(innkeeper::config::other))]
    Other(String),
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a `figment::Error` (possibly carrying several errors) into diagnostics.
///
/// `toml_sources` pairs file paths with their contents; an unknown key found
/// in one of them gets a source span.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let table = error
                .path
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(".");
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = locate_key(&error, &table, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        table: if table.is_empty() {
                            "the top level".to_string()
                        } else {
                            format!("[{table}]")
                        },
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                    key: table,
                    found: actual.to_string(),
                    expected: expected.clone(),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn locate_key(
    error: &figment::error::Error,
    table: &str,
    key: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let path = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    let found = path.and_then(|path| {
        let (name, content) = toml_sources.iter().find(|(p, _)| *p == path)?;
        let offset = key_offset(content, table, key)?;
        Some((offset, name, content))
    });
    match found {
        Some((offset, name, content)) => (
            Some(SourceSpan::new(offset.into(), key.len())),
            Some(NamedSource::new(name, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `key` inside TOML table `table` (dotted; empty for the root).
///
/// Matches `key = ...` lines while the most recent header is `[table]`, or a
/// `[table.key]` header itself. Quoted keys and inline tables are not handled.
pub fn key_offset(content: &str, table: &str, key: &str) -> Option<usize> {
    let qualified = if table.is_empty() {
        key.to_string()
    } else {
        format!("{table}.{key}")
    };

    let mut current = String::new();
    let mut line_start = 0;
    for line in content.split_inclusive('\n') {
        let start = line_start;
        line_start += line.len();
        let trimmed = line.trim_start();

        if trimmed.starts_with('[') {
            current = trimmed
                .trim_start_matches('[')
                .split(']')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            if current == qualified {
                return line.find(key).map(|at| start + at);
            }
            continue;
        }

        if current == table
            && let Some((name, _)) = trimmed.split_once('=')
            && name.trim() == key
        {
            return Some(start + line.len() - trimmed.len());
        }
    }

    None
}

/// Best Jaro-Winkler match for `unknown` among `valid_keys`, above the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print diagnostics to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut rendered = String::new();
        match handler.render_report(&mut rendered, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{rendered}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InnkeeperConfig;
    use figment::providers::{Format, Toml};
    use figment::Figment;

    #[test]
    fn suggests_the_nearest_queue_key() {
        let valid = &["workers", "batch_size", "max_retries"];
        assert_eq!(suggest_key("max_retires", valid), Some("max_retries".to_string()));
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn suggests_whatsapp_credentials() {
        let valid = &["access_token", "phone_number_id", "verify_token"];
        assert_eq!(
            suggest_key("acess_token", valid),
            Some("access_token".to_string())
        );
    }

    #[test]
    fn key_offset_stays_inside_its_table() {
        let content = "[agent]\nname = \"x\"\n\n[queue]\nname = 2\n";
        let offset = key_offset(content, "queue", "name").unwrap();
        assert_eq!(offset, content.rfind("name").unwrap());
        assert_eq!(key_offset(content, "agent", "name"), Some(8));
        assert_eq!(key_offset(content, "gateway", "name"), None);
    }

    #[test]
    fn key_offset_finds_unknown_tables() {
        let content = "[agent]\nname = \"x\"\n\n[telegram]\nbot_token = \"abc\"\n";
        let offset = key_offset(content, "", "telegram").unwrap();
        assert_eq!(&content[offset..offset + 8], "telegram");
    }

    #[test]
    fn unknown_key_in_file_carries_a_span() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("innkeeper.toml");
        let content = "[queue]\nworkers = 2\nwokers = 3\n";
        std::fs::write(&path, content).unwrap();

        let err = Figment::from(Toml::file(&path))
            .extract::<InnkeeperConfig>()
            .unwrap_err();
        let sources = vec![(path.display().to_string(), content.to_string())];
        let errors = figment_to_config_errors(err, &sources);

        match &errors[..] {
            [ConfigError::UnknownKey {
                key,
                table,
                suggestion,
                span: Some(span),
                ..
            }] => {
                assert_eq!(key, "wokers");
                assert_eq!(table, "[queue]");
                assert_eq!(suggestion.as_deref(), Some("workers"));
                assert_eq!(span.offset(), content.find("wokers").unwrap());
            }
            other => panic!("unexpected errors: {other:?}"),
        }
    }
}
