// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the WhatsApp Cloud API messages endpoint.
//!
//! [`WhatsAppClient`] builds the request, authenticates with the access
//! token and maps every failure onto a [`DeliveryError`] the delivery worker
//! can classify. It never retries; retry policy belongs to the queue.

use std::time::Duration;

use innkeeper_core::{DeliveryError, InnkeeperError, ProviderMessageId};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::debug;

use crate::types::{ApiErrorResponse, SendResponse};

/// Graph error codes meaning the recipient cannot be reached at all.
///
/// 131021: recipient cannot be the sender. 131026: message undeliverable
/// (not a WhatsApp user, outdated client). 131030: recipient not in the
/// test allow-list.
const UNREACHABLE_RECIPIENT_CODES: [i64; 3] = [131021, 131026, 131030];

#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    client: reqwest::Client,
    messages_url: String,
    timeout: Duration,
}

impl WhatsAppClient {
    /// Creates a client posting to
    /// `{api_base_url}/{api_version}/{phone_number_id}/messages`.
    pub fn new(
        access_token: &str,
        phone_number_id: &str,
        api_base_url: &str,
        api_version: &str,
        timeout: Duration,
    ) -> Result<Self, InnkeeperError> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|e| InnkeeperError::Config(format!("invalid access token header value: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| InnkeeperError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            messages_url: format!(
                "{}/{}/{}/messages",
                api_base_url.trim_end_matches('/'),
                api_version.trim_matches('/'),
                phone_number_id
            ),
            timeout,
        })
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }

    /// Posts one message. `payload` is the message body minus the routing
    /// fields, e.g. `{"type": "text", "text": {"body": "..."}}`.
    pub async fn send(
        &self,
        recipient: &str,
        payload: &serde_json::Value,
    ) -> Result<ProviderMessageId, DeliveryError> {
        let body = build_body(recipient, payload)?;

        let response = self
            .client
            .post(&self.messages_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(status = %status, recipient, "messages endpoint answered");

        if status.is_success() {
            let parsed: SendResponse =
                serde_json::from_str(&text).map_err(|e| DeliveryError::Provider {
                    status_code: status.as_u16(),
                    message: format!("unreadable send response: {e}"),
                })?;
            return parsed
                .messages
                .into_iter()
                .next()
                .map(|m| ProviderMessageId(m.id))
                .ok_or_else(|| DeliveryError::Provider {
                    status_code: status.as_u16(),
                    message: "send response carried no message id".to_string(),
                });
        }

        Err(classify_error(status.as_u16(), &text))
    }

    fn transport_error(&self, e: reqwest::Error) -> DeliveryError {
        if e.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            DeliveryError::Network(e.to_string())
        }
    }
}

/// Adds `messaging_product` and `to` to the caller's payload.
fn build_body(
    recipient: &str,
    payload: &serde_json::Value,
) -> Result<serde_json::Value, DeliveryError> {
    let serde_json::Value::Object(fields) = payload else {
        // Rejected locally the way the API would reject it.
        return Err(DeliveryError::Provider {
            status_code: 400,
            message: "payload must be a JSON object".to_string(),
        });
    };
    let mut body = fields.clone();
    body.insert("messaging_product".into(), "whatsapp".into());
    body.insert("recipient_type".into(), "individual".into());
    body.insert("to".into(), recipient.into());
    Ok(serde_json::Value::Object(body))
}

/// Maps a non-2xx answer onto a delivery error.
fn classify_error(status_code: u16, body: &str) -> DeliveryError {
    let Ok(envelope) = serde_json::from_str::<ApiErrorResponse>(body) else {
        return DeliveryError::Provider {
            status_code,
            message: if body.is_empty() {
                format!("HTTP {status_code}")
            } else {
                body.to_string()
            },
        };
    };

    let error = envelope.error;
    let message = match error.error_data.and_then(|d| d.details) {
        Some(details) => format!("{} ({details})", error.message),
        None => error.message,
    };
    match error.code {
        Some(code) if UNREACHABLE_RECIPIENT_CODES.contains(&code) => {
            DeliveryError::InvalidRecipient(format!("{message} [code {code}]"))
        }
        Some(code) => DeliveryError::Provider {
            status_code,
            message: format!("{message} [code {code}]"),
        },
        None => DeliveryError::Provider {
            status_code,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> WhatsAppClient {
        WhatsAppClient::new(
            "test-token",
            "1234567890",
            base_url,
            "v21.0",
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn text_payload() -> serde_json::Value {
        json!({"type": "text", "text": {"body": "Your room is ready"}})
    }

    #[test]
    fn url_joins_segments() {
        let client = test_client("https://graph.example.com/");
        assert_eq!(
            client.messages_url(),
            "https://graph.example.com/v21.0/1234567890/messages"
        );
    }

    #[test]
    fn body_merges_routing_fields() {
        let body = build_body("15550001111", &text_payload()).unwrap();
        assert_eq!(body["messaging_product"], "whatsapp");
        assert_eq!(body["to"], "15550001111");
        assert_eq!(body["text"]["body"], "Your room is ready");
    }

    #[test]
    fn non_object_payload_is_permanent() {
        let err = build_body("15550001111", &json!("hello")).unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn send_success_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/1234567890/messages"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "15550001111",
                "type": "text"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "contacts": [{"input": "15550001111", "wa_id": "15550001111"}],
                "messages": [{"id": "wamid.HBgL"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = test_client(&server.uri())
            .send("15550001111", &text_payload())
            .await
            .unwrap();
        assert_eq!(id, ProviderMessageId("wamid.HBgL".into()));
    }

    #[tokio::test]
    async fn undeliverable_code_maps_to_invalid_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "Message Undeliverable.",
                    "type": "OAuthException",
                    "code": 131026,
                    "error_data": {"details": "recipient is not a WhatsApp user"}
                }
            })))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .send("15550001111", &text_payload())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidRecipient(ref m) if m.contains("131026")));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn throttling_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit hit", "code": 130429}
            })))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .send("15550001111", &text_payload())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DeliveryError::Provider {
                status_code: 429,
                message: "Rate limit hit [code 130429]".into()
            }
        );
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn success_without_message_id_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": []})))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .send("15550001111", &text_payload())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DeliveryError::Provider {
                status_code: 200,
                message: "send response carried no message id".into()
            }
        );
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn unreadable_success_body_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .send("15550001111", &text_payload())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Provider { status_code: 200, ref message }
                if message.starts_with("unreadable send response")
        ));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn server_error_without_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .send("15550001111", &text_payload())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DeliveryError::Provider {
                status_code: 502,
                message: "HTTP 502".into()
            }
        );
    }

    #[tokio::test]
    async fn slow_answer_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(json!({"messages": [{"id": "late"}]})),
            )
            .mount(&server)
            .await;

        let client = WhatsAppClient::new(
            "t",
            "1",
            &server.uri(),
            "v21.0",
            Duration::from_millis(100),
        )
        .unwrap();
        let err = client.send("15550001111", &text_payload()).await.unwrap_err();
        assert_eq!(err, DeliveryError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn connection_refused_is_network() {
        // Nothing listens on the discard port.
        let client = test_client("http://127.0.0.1:9");
        let err = client.send("15550001111", &text_payload()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Network(_)), "got {err:?}");
    }
}
