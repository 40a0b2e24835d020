// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use innkeeper_core::{InnkeeperError, Priority, QueueStats};
use innkeeper_queue::EnqueueRequest;
use innkeeper_whatsapp::webhook;
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

/// Request body for POST /v1/messages.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub recipient: String,
    /// Provider message body, stored as-is.
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Response body for POST /v1/messages.
#[derive(Debug, Serialize)]
pub struct EnqueuedResponse {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query of the webhook subscription handshake.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
///
/// Prometheus text exposition, or 404 when metrics are disabled.
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metrics are disabled"),
    }
}

/// GET /v1/queue/stats
pub async fn get_queue_stats(State(state): State<GatewayState>) -> Result<Json<QueueStats>, Response> {
    state.dispatcher.stats().await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "queue stats failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "queue stats unavailable")
    })
}

/// POST /v1/messages
///
/// Validates and enqueues; answers 202 with the item id without waiting
/// for delivery.
pub async fn post_messages(
    State(state): State<GatewayState>,
    Json(body): Json<MessageRequest>,
) -> Response {
    let request = EnqueueRequest::new(body.recipient, body.payload)
        .priority(body.priority.unwrap_or_default());

    match state.dispatcher.enqueue_with(request).await {
        Ok(id) => (StatusCode::ACCEPTED, Json(EnqueuedResponse { id })).into_response(),
        Err(InnkeeperError::Validation(message)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, message)
        }
        Err(e) => {
            tracing::error!(error = %e, "enqueue failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "enqueue failed")
        }
    }
}

/// GET /webhooks/whatsapp
pub async fn verify_webhook(
    State(state): State<GatewayState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let Some(expected) = state.webhook.verify_token.as_deref() else {
        tracing::warn!("webhook handshake refused: no verify token configured");
        return StatusCode::FORBIDDEN.into_response();
    };
    match webhook::verify_subscription(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
        expected,
    ) {
        Some(challenge) => {
            tracing::info!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => StatusCode::FORBIDDEN.into_response(),
    }
}

/// POST /webhooks/whatsapp
///
/// Checks the signature over the raw body, then forwards each guest
/// message on the inbound channel.
pub async fn receive_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(secret) = state.webhook.app_secret.as_deref() else {
        tracing::warn!("webhook notification refused: no app secret configured");
        return StatusCode::UNAUTHORIZED;
    };
    let signature = headers
        .get(webhook::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if !webhook::verify_signature(secret.as_bytes(), &body, signature) {
        tracing::warn!("webhook notification with bad signature");
        return StatusCode::UNAUTHORIZED;
    }

    let messages = match webhook::parse_inbound(&body) {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable webhook notification");
            return StatusCode::BAD_REQUEST;
        }
    };

    for message in messages {
        let id = message.id.clone();
        if state.inbound_tx.send(message).await.is_err() {
            tracing::warn!(message_id = %id, "inbound channel closed, dropping message");
        }
    }
    StatusCode::OK
}
