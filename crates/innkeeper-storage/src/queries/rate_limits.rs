// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-recipient rolling rate-limit windows.

use std::time::Duration;

use chrono::{DateTime, Utc};
use innkeeper_core::clock::after;
use innkeeper_core::{InnkeeperError, RateWindow};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::database::{map_tr_err, Database};
use crate::models::{from_db_time, rate_window_from_row, to_db_time};

/// Admit one send for `recipient` if its window has room.
///
/// Runs in an `IMMEDIATE` transaction so concurrent admits from other
/// connections queue on the write lock instead of racing the read. The
/// increment itself is conditional on `message_count < limit`, so the count
/// can never pass the limit.
pub async fn try_admit(
    db: &Database,
    recipient: &str,
    now: DateTime<Utc>,
    limit: u32,
    window: Duration,
) -> Result<bool, InnkeeperError> {
    if limit == 0 {
        return Ok(false);
    }

    let recipient = recipient.to_string();
    let window_end = to_db_time(after(now, window));
    let now_text = to_db_time(now);

    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current_end: Option<String> = tx
                .query_row(
                    "SELECT window_end FROM rate_limits WHERE recipient = ?1",
                    params![recipient],
                    |row| row.get(0),
                )
                .optional()?;
            let active = current_end
                .as_deref()
                .and_then(from_db_time)
                .is_some_and(|end| now < end);

            let admitted = if active {
                tx.execute(
                    "UPDATE rate_limits SET message_count = message_count + 1
                     WHERE recipient = ?1 AND message_count < ?2",
                    params![recipient, limit],
                )? == 1
            } else {
                tx.execute(
                    "INSERT INTO rate_limits (recipient, window_start, window_end, message_count)
                     VALUES (?1, ?2, ?3, 1)
                     ON CONFLICT(recipient) DO UPDATE SET
                         window_start = excluded.window_start,
                         window_end = excluded.window_end,
                         message_count = 1",
                    params![recipient, now_text, window_end],
                )?;
                true
            };

            tx.commit()?;
            Ok(admitted)
        })
        .await
        .map_err(map_tr_err)
}

/// The stored window for `recipient`, active or not.
pub async fn get_window(
    db: &Database,
    recipient: &str,
) -> Result<Option<RateWindow>, InnkeeperError> {
    let recipient = recipient.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT recipient, window_start, window_end, message_count
                 FROM rate_limits WHERE recipient = ?1",
                params![recipient],
                rate_window_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
