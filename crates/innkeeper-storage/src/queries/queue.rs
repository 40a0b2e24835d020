// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations for crash-safe, multi-worker message delivery.

use std::time::Duration;

use chrono::{DateTime, Utc};
use innkeeper_core::clock::after;
use innkeeper_core::{Claim, InnkeeperError, NewQueueItem, QueueItem, QueueStats, QueueStatus};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{queue_item_from_row, time_column, to_db_time, QUEUE_ITEM_COLUMNS};

/// Error recorded on items returned to `pending` by the lease reaper.
pub const LEASE_EXPIRED_ERROR: &str = "claim lease expired";

/// Persist a new `pending` item. Returns the assigned id.
pub async fn insert(
    db: &Database,
    item: NewQueueItem,
    now: DateTime<Utc>,
) -> Result<i64, InnkeeperError> {
    if item.recipient.trim().is_empty() {
        return Err(InnkeeperError::Validation(
            "recipient must not be empty".to_string(),
        ));
    }
    if item.payload.is_null() {
        return Err(InnkeeperError::Validation(
            "payload must not be null".to_string(),
        ));
    }

    let payload = item.payload.to_string();
    let now_text = to_db_time(now);
    let scheduled = to_db_time(item.not_before.map_or(now, |at| at.max(now)));
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO message_queue
                     (recipient, payload, priority, status, attempt, max_retries,
                      scheduled_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5, ?6, ?6)",
                params![
                    item.recipient,
                    payload,
                    item.priority.rank(),
                    item.max_retries,
                    scheduled,
                    now_text
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one item by id.
pub async fn get(db: &Database, id: i64) -> Result<Option<QueueItem>, InnkeeperError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {QUEUE_ITEM_COLUMNS} FROM message_queue WHERE id = ?1"),
                params![id],
                queue_item_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Claim up to `limit` due items, moving them from `pending` to `processing`.
///
/// The select and the status change happen in one `UPDATE ... RETURNING`
/// statement. The outer `status = 'pending'` guard means a row another
/// connection claimed in between is skipped rather than returned twice.
pub async fn claim_next_batch(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<QueueItem>, InnkeeperError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let now = to_db_time(now);

    let mut items = db
        .connection()
        .call(move |conn| -> Result<Vec<QueueItem>, rusqlite::Error> {
            let mut stmt = conn.prepare_cached(&format!(
                "UPDATE message_queue
                 SET status = 'processing', claimed_at = ?1, updated_at = ?1
                 WHERE id IN (
                     SELECT id FROM message_queue
                     WHERE status = 'pending' AND scheduled_at <= ?1
                     ORDER BY priority DESC, created_at ASC, id ASC
                     LIMIT ?2
                 )
                 AND status = 'pending'
                 RETURNING {QUEUE_ITEM_COLUMNS}"
            ))?;
            let rows = stmt.query_map(params![now, limit], queue_item_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    // RETURNING row order is unspecified.
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    Ok(items)
}

/// Extend the lease on a claimed item to `now`.
///
/// Fails with `ClaimLost` if the item is no longer `processing` under this
/// lease, i.e. the reaper released it and possibly another worker took it.
pub async fn renew_claim(
    db: &Database,
    claim: Claim,
    now: DateTime<Utc>,
) -> Result<Claim, InnkeeperError> {
    let lease = to_db_time(claim.leased_at);
    let now = to_db_time(now);
    let id = claim.id;
    let renewed = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "UPDATE message_queue SET claimed_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'processing' AND claimed_at = ?3
                 RETURNING claimed_at",
                params![now, id, lease],
                |row| time_column(row, 0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    match renewed {
        Some(leased_at) => Ok(Claim { id, leased_at }),
        None => Err(lost_or_missing(db, id).await),
    }
}

/// Mark an item delivered.
pub async fn mark_completed(
    db: &Database,
    claim: Claim,
    now: DateTime<Utc>,
) -> Result<(), InnkeeperError> {
    let lease = to_db_time(claim.leased_at);
    let now = to_db_time(now);
    let id = claim.id;
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE message_queue SET status = 'completed', updated_at = ?1
                 WHERE id = ?2 AND status = 'processing' AND claimed_at = ?3",
                params![now, id, lease],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(lost_or_missing(db, id).await);
    }
    Ok(())
}

/// Record a failed send attempt.
///
/// Increments `attempt`. While the budget lasts the item goes back to
/// `pending` at `now + backoff`; the attempt that reaches `max_retries`
/// leaves it `failed`. Returns the resulting status.
pub async fn mark_failed_attempt(
    db: &Database,
    claim: Claim,
    error: &str,
    backoff: Duration,
    now: DateTime<Utc>,
) -> Result<QueueStatus, InnkeeperError> {
    let error = error.to_string();
    let retry_at = to_db_time(after(now, backoff));
    let lease = to_db_time(claim.leased_at);
    let now = to_db_time(now);
    let id = claim.id;

    let status: Option<String> = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "UPDATE message_queue
                 SET attempt = attempt + 1,
                     status = CASE WHEN attempt + 1 < max_retries THEN 'pending' ELSE 'failed' END,
                     scheduled_at = CASE WHEN attempt + 1 < max_retries THEN ?1 ELSE scheduled_at END,
                     error = ?2,
                     updated_at = ?3
                 WHERE id = ?4 AND status = 'processing' AND claimed_at = ?5
                 RETURNING status",
                params![retry_at, error, now, id, lease],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    let Some(status) = status else {
        return Err(lost_or_missing(db, id).await);
    };
    status
        .parse::<QueueStatus>()
        .map_err(|e| InnkeeperError::Storage {
            source: Box::new(e),
        })
}

/// Record a send that can never succeed. Consumes an attempt and fails the
/// item regardless of the remaining budget.
pub async fn mark_permanently_failed(
    db: &Database,
    claim: Claim,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), InnkeeperError> {
    let error = error.to_string();
    let lease = to_db_time(claim.leased_at);
    let now = to_db_time(now);
    let id = claim.id;
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE message_queue
                 SET attempt = attempt + 1, status = 'failed', error = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'processing' AND claimed_at = ?4",
                params![error, now, id, lease],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(lost_or_missing(db, id).await);
    }
    Ok(())
}

/// Return an item to `pending` until `until`, leaving `attempt` untouched.
pub async fn defer(
    db: &Database,
    claim: Claim,
    until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), InnkeeperError> {
    let until = to_db_time(until);
    let lease = to_db_time(claim.leased_at);
    let now = to_db_time(now);
    let id = claim.id;
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE message_queue
                 SET status = 'pending', scheduled_at = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'processing' AND claimed_at = ?4",
                params![until, now, id, lease],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(lost_or_missing(db, id).await);
    }
    Ok(())
}

/// Error for a guarded transition that matched no row.
async fn lost_or_missing(db: &Database, id: i64) -> InnkeeperError {
    match get(db, id).await {
        Ok(Some(_)) => InnkeeperError::ClaimLost { id },
        Ok(None) => InnkeeperError::queue_item_not_found(id),
        Err(e) => e,
    }
}

/// Return `processing` items claimed before `claimed_before` to `pending`.
///
/// Used to recover items whose worker died mid-send. Returns how many rows
/// were released.
pub async fn release_expired_claims(
    db: &Database,
    claimed_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, InnkeeperError> {
    let cutoff = to_db_time(claimed_before);
    let now = to_db_time(now);
    let released = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE message_queue
                 SET status = 'pending', error = ?1, updated_at = ?2
                 WHERE status = 'processing' AND claimed_at < ?3",
                params![LEASE_EXPIRED_ERROR, now, cutoff],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(released as u64)
}

/// Count items per status.
pub async fn stats(db: &Database) -> Result<QueueStats, InnkeeperError> {
    let counts = db
        .connection()
        .call(|conn| -> Result<Vec<(String, u64)>, rusqlite::Error> {
            let mut stmt = conn
                .prepare_cached("SELECT status, COUNT(*) FROM message_queue GROUP BY status")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    let mut stats = QueueStats::default();
    for (status, count) in counts {
        match status.parse::<QueueStatus>() {
            Ok(QueueStatus::Pending) => stats.pending = count,
            Ok(QueueStatus::Processing) => stats.processing = count,
            Ok(QueueStatus::Completed) => stats.completed = count,
            Ok(QueueStatus::Failed) => stats.failed = count,
            Err(_) => tracing::warn!(status = %status, count, "ignoring unknown queue status"),
        }
    }
    Ok(stats)
}
