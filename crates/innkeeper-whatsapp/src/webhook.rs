// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp webhook handling: subscription handshake, payload signature
//! check and inbound message parsing.
//!
//! These are plain functions over strings and bytes; the HTTP routes that
//! call them live in the gateway.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use innkeeper_core::{InboundMessage, MessageContent};
use sha2::Sha256;
use tracing::debug;

use crate::types::{WebhookMessage, WebhookPayload};

/// Header carrying `sha256=<hex hmac>` of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Answer to the `GET` subscription handshake.
///
/// Returns the challenge to echo when `mode` is `subscribe` and the token
/// matches, `None` otherwise.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    match (mode, token, challenge) {
        (Some("subscribe"), Some(token), Some(challenge)) if token == expected_token => {
            Some(challenge.to_string())
        }
        _ => None,
    }
}

/// Checks an `X-Hub-Signature-256` header against the raw body.
pub fn verify_signature(app_secret: &[u8], body: &[u8], header: Option<&str>) -> bool {
    let Some(signature_hex) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Computes the header value a sender would attach to `body`.
pub fn sign(app_secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match Hmac::<Sha256>::new_from_slice(app_secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Extracts guest messages from a webhook body.
///
/// Status callbacks (sent, delivered, read) carry no messages and yield an
/// empty list.
pub fn parse_inbound(body: &[u8]) -> Result<Vec<InboundMessage>, serde_json::Error> {
    let payload: WebhookPayload = serde_json::from_slice(body)?;
    let mut inbound = Vec::new();

    for change in payload.entry.into_iter().flat_map(|e| e.changes) {
        let value = change.value;
        for message in value.messages {
            let sender_name = value
                .contacts
                .iter()
                .find(|c| c.wa_id == message.from)
                .and_then(|c| c.profile.as_ref())
                .map(|p| p.name.clone());
            inbound.push(to_inbound(message, sender_name));
        }
    }

    debug!(count = inbound.len(), "parsed webhook messages");
    Ok(inbound)
}

fn to_inbound(message: WebhookMessage, sender_name: Option<String>) -> InboundMessage {
    let timestamp = message
        .timestamp
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    let content = match (message.kind.as_str(), message.text, message.audio) {
        ("text", Some(text), _) => MessageContent::Text(text.body),
        ("audio", _, Some(audio)) => MessageContent::Audio {
            media_id: audio.id,
            mime_type: audio.mime_type,
        },
        (kind, _, _) => MessageContent::Unsupported(kind.to_string()),
    };

    InboundMessage {
        id: message.id,
        sender: message.from,
        sender_name,
        content,
        timestamp,
    }
}
