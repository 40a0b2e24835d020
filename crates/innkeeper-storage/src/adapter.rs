// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use innkeeper_config::model::StorageConfig;
use innkeeper_core::{
    AdapterType, Claim, HealthStatus, InnkeeperError, NewQueueItem, PluginAdapter, QueueItem,
    QueueStats, QueueStatus, QueueStore, RateLimitStore, RateWindow, StorageAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed queue and rate-limit store.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on [`StorageAdapter::initialize`], or supplied
/// up front with [`SqliteStorage::with_database`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a storage adapter; nothing is opened until `initialize`.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database.
    pub fn with_database(db: Database) -> Self {
        let config = StorageConfig {
            database_path: db.path().to_string(),
            ..StorageConfig::default()
        };
        Self {
            config,
            db: OnceCell::from(db),
        }
    }

    /// Open the configured database and return a ready adapter.
    pub async fn open(config: StorageConfig) -> Result<Self, InnkeeperError> {
        let storage = Self::new(config);
        storage.initialize().await?;
        Ok(storage)
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn db(&self) -> Result<&Database, InnkeeperError> {
        self.db.get().ok_or_else(|| InnkeeperError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, InnkeeperError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), InnkeeperError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), InnkeeperError> {
        let db = Database::open_with_config(&self.config).await?;
        self.db.set(db).map_err(|_| InnkeeperError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), InnkeeperError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SqliteStorage {
    async fn insert(&self, item: NewQueueItem, now: DateTime<Utc>) -> Result<i64, InnkeeperError> {
        queries::queue::insert(self.db()?, item, now).await
    }

    async fn get(&self, id: i64) -> Result<Option<QueueItem>, InnkeeperError> {
        queries::queue::get(self.db()?, id).await
    }

    async fn claim_next_batch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, InnkeeperError> {
        queries::queue::claim_next_batch(self.db()?, limit, now).await
    }

    async fn renew_claim(&self, claim: Claim, now: DateTime<Utc>) -> Result<Claim, InnkeeperError> {
        queries::queue::renew_claim(self.db()?, claim, now).await
    }

    async fn mark_completed(&self, claim: Claim, now: DateTime<Utc>) -> Result<(), InnkeeperError> {
        queries::queue::mark_completed(self.db()?, claim, now).await
    }

    async fn mark_failed_attempt(
        &self,
        claim: Claim,
        error: &str,
        backoff: Duration,
        now: DateTime<Utc>,
    ) -> Result<QueueStatus, InnkeeperError> {
        queries::queue::mark_failed_attempt(self.db()?, claim, error, backoff, now).await
    }

    async fn mark_permanently_failed(
        &self,
        claim: Claim,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InnkeeperError> {
        queries::queue::mark_permanently_failed(self.db()?, claim, error, now).await
    }

    async fn defer(
        &self,
        claim: Claim,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), InnkeeperError> {
        queries::queue::defer(self.db()?, claim, until, now).await
    }

    async fn release_expired_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, InnkeeperError> {
        queries::queue::release_expired_claims(self.db()?, claimed_before, now).await
    }

    async fn stats(&self) -> Result<QueueStats, InnkeeperError> {
        queries::queue::stats(self.db()?).await
    }
}

#[async_trait]
impl RateLimitStore for SqliteStorage {
    async fn try_admit(
        &self,
        recipient: &str,
        now: DateTime<Utc>,
        limit: u32,
        window: Duration,
    ) -> Result<bool, InnkeeperError> {
        queries::rate_limits::try_admit(self.db()?, recipient, now, limit, window).await
    }

    async fn rate_window(&self, recipient: &str) -> Result<Option<RateWindow>, InnkeeperError> {
        queries::rate_limits::get_window(self.db()?, recipient).await
    }
}
