// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `innkeeper-core`.
//!
//! Timestamps are stored as `YYYY-MM-DDTHH:MM:SS.sssZ` text, which sorts
//! chronologically, so range predicates can compare them as strings. That
//! only holds for four-digit years; values are clamped to
//! [`clock::origin`]..=[`clock::horizon`] on the way in.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

pub use innkeeper_core::types::{QueueItem, QueueStats, QueueStatus, RateWindow};
use innkeeper_core::clock;
use innkeeper_core::Priority;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Columns selected by every query that materializes a [`QueueItem`].
pub(crate) const QUEUE_ITEM_COLUMNS: &str = "id, recipient, payload, priority, status, attempt, \
     max_retries, scheduled_at, created_at, updated_at, claimed_at, error";

/// Formats a timestamp for storage.
pub fn to_db_time(at: DateTime<Utc>) -> String {
    at.clamp(clock::origin(), clock::horizon())
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Parses a stored timestamp.
pub fn from_db_time(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

#[derive(Debug)]
struct BadColumn(String);

impl std::fmt::Display for BadColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BadColumn {}

pub(crate) fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    from_db_time(&text).ok_or_else(|| conversion_error(idx, BadColumn(format!("bad timestamp `{text}`"))))
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => time_column(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Maps a row selected with [`QUEUE_ITEM_COLUMNS`].
pub(crate) fn queue_item_from_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    let payload: String = row.get(2)?;
    let payload = serde_json::from_str(&payload).map_err(|e| conversion_error(2, e))?;

    let rank: i64 = row.get(3)?;
    let priority = Priority::from_rank(rank)
        .ok_or_else(|| conversion_error(3, BadColumn(format!("bad priority rank {rank}"))))?;

    let status: String = row.get(4)?;
    let status = status
        .parse::<QueueStatus>()
        .map_err(|e| conversion_error(4, e))?;

    Ok(QueueItem {
        id: row.get(0)?,
        recipient: row.get(1)?,
        payload,
        priority,
        status,
        attempt: row.get(5)?,
        max_retries: row.get(6)?,
        scheduled_at: time_column(row, 7)?,
        created_at: time_column(row, 8)?,
        updated_at: time_column(row, 9)?,
        claimed_at: optional_time_column(row, 10)?,
        error: row.get(11)?,
    })
}

/// Maps a `recipient, window_start, window_end, message_count` row.
pub(crate) fn rate_window_from_row(row: &Row<'_>) -> rusqlite::Result<RateWindow> {
    Ok(RateWindow {
        recipient: row.get(0)?,
        window_start: time_column(row, 1)?,
        window_end: time_column(row, 2)?,
        message_count: row.get(3)?,
    })
}
