// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Innkeeper delivery pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single
//! background connection per handle via `tokio-rusqlite`, and the atomic
//! queue and rate-limit operations the delivery worker relies on.
//!
//! Every state transition is one SQL statement (or one `IMMEDIATE`
//! transaction), so several handles, in this process or others, can share
//! one database file.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
