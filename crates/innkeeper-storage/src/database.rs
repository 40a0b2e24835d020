// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements issued through one [`Database`] run on tokio-rusqlite's
//! single background thread. Separate handles on the same file (other
//! workers, other processes) coordinate through SQLite's own locking, which
//! is why every queue transition is a single atomic statement.

use std::path::Path;
use std::time::Duration;

use innkeeper_config::model::StorageConfig;
use innkeeper_core::InnkeeperError;
use tracing::debug;

use crate::migrations::run_migrations;

/// Connection options applied on open.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub wal_mode: bool,
    pub busy_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&StorageConfig> for OpenOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            wal_mode: config.wal_mode,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }
    }
}

/// A migrated SQLite database behind a tokio-rusqlite connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Opens (creating if needed) the database at `path` with default options.
    pub async fn open(path: &str) -> Result<Self, InnkeeperError> {
        Self::open_with(path, &OpenOptions::default()).await
    }

    /// Opens the database described by a `[storage]` config section.
    pub async fn open_with_config(config: &StorageConfig) -> Result<Self, InnkeeperError> {
        Self::open_with(&config.database_path, &OpenOptions::from(config)).await
    }

    /// Opens the database, applies PRAGMAs and runs pending migrations.
    pub async fn open_with(path: &str, options: &OpenOptions) -> Result<Self, InnkeeperError> {
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| InnkeeperError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| InnkeeperError::Storage {
                source: Box::new(e),
            })?;

        let wal_mode = options.wal_mode;
        let busy_timeout = options.busy_timeout;
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            if wal_mode {
                let _mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    "WAL",
                    |row| row.get(0),
                )?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| run_migrations(conn))
            .await
            .map_err(|e: tokio_rusqlite::Error<InnkeeperError>| InnkeeperError::Storage {
                source: Box::new(e),
            })?;

        debug!(path, wal_mode, "database opened");
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Checkpoints the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), InnkeeperError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoints the WAL and closes the background connection.
    pub async fn close(self) -> Result<(), InnkeeperError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(|e| InnkeeperError::Storage {
            source: Box::new(e),
        })?;
        debug!(path = %self.path, "database closed");
        Ok(())
    }
}

/// Maps a tokio-rusqlite error into the storage error variant.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> InnkeeperError {
    InnkeeperError::Storage {
        source: Box::new(e),
    }
}
