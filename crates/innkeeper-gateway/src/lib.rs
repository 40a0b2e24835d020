// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for Innkeeper.
//!
//! Exposes health and Prometheus metrics publicly, a bearer-authenticated
//! `/v1` API for enqueueing messages and reading queue stats, and the
//! WhatsApp webhook that feeds guest messages to the conversational layer.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{router, start_server, GatewayState, HealthState, ServerConfig, WebhookConfig};
