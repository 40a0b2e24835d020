// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness with a temp SQLite database and a manual clock.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use innkeeper_config::model::StorageConfig;
use innkeeper_core::{InnkeeperError, ManualClock, QueueItem, QueueStore};
use innkeeper_storage::SqliteStorage;

/// A migrated database in a temp directory, plus a clock tests control.
///
/// The directory lives as long as the harness.
pub struct TestHarness {
    pub storage: Arc<SqliteStorage>,
    pub clock: Arc<ManualClock>,
    db_path: String,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Fixed start time so stored timestamps are predictable.
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub async fn new() -> Result<Self, InnkeeperError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| InnkeeperError::Storage {
            source: Box::new(e),
        })?;
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .into_owned();

        let storage = SqliteStorage::open(StorageConfig {
            database_path: db_path.clone(),
            ..StorageConfig::default()
        })
        .await?;

        Ok(Self {
            storage: Arc::new(storage),
            clock: Arc::new(ManualClock::new(Self::epoch())),
            db_path,
            _temp_dir: temp_dir,
        })
    }

    /// Path of the harness database, for opening extra connections.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// A second, independent storage handle on the same file.
    pub async fn open_second_handle(&self) -> Result<SqliteStorage, InnkeeperError> {
        SqliteStorage::open(StorageConfig {
            database_path: self.db_path.clone(),
            ..StorageConfig::default()
        })
        .await
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }

    /// Fetch an item that must exist.
    pub async fn item(&self, id: i64) -> Result<QueueItem, InnkeeperError> {
        self.storage
            .get(id)
            .await?
            .ok_or_else(|| InnkeeperError::queue_item_not_found(id))
    }
}
