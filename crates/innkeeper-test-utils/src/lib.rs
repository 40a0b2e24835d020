// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Innkeeper integration tests.
//!
//! Provides a scripted messaging provider and a temp-database harness for
//! fast, deterministic tests without network access or wall-clock waits.
//!
//! # Components
//!
//! - [`MockProvider`] - provider whose outcomes are scripted per call
//! - [`TestHarness`] - temp SQLite storage plus a [`ManualClock`](innkeeper_core::ManualClock)

pub mod harness;
pub mod mock_provider;

pub use harness::TestHarness;
pub use mock_provider::{MockProvider, Outcome, SentMessage};
