// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use mmsd_config::MmsdConfig;
use mmsd_core::{
    AdapterType, HealthStatus, Message, MessageFilter, MessageId, MmsdError, PluginAdapter,
    StorageAdapter,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// Where the database lives.
#[derive(Debug, Clone)]
enum Location {
    File { path: PathBuf, wal_mode: bool },
    Memory,
}

/// SQLite-backed message store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily opened on the first call
/// to [`StorageAdapter::initialize`].
pub struct SqliteStore {
    location: Location,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// A store at `path`. Nothing is opened until `initialize`.
    pub fn new(path: impl Into<PathBuf>, wal_mode: bool) -> Self {
        Self {
            location: Location::File {
                path: path.into(),
                wal_mode,
            },
            db: OnceCell::new(),
        }
    }

    /// A store at the configured database path.
    pub fn from_config(config: &MmsdConfig) -> Self {
        Self::new(config.database_path(), config.storage.wal_mode)
    }

    /// A private in-memory store. Contents vanish with the handle.
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            db: OnceCell::new(),
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, MmsdError> {
        self.db.get().ok_or_else(|| MmsdError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MmsdError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MmsdError> {
        match self.db.get() {
            Some(db) => db.close().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageAdapter for SqliteStore {
    async fn initialize(&self) -> Result<(), MmsdError> {
        let db = match &self.location {
            Location::File { path, wal_mode } => Database::open_with(path, *wal_mode).await?,
            Location::Memory => Database::open_in_memory().await?,
        };
        self.db.set(db).map_err(|_| MmsdError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(location = ?self.location, "SQLite store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), MmsdError> {
        self.db()?.close().await
    }

    async fn create(&self, msg: &Message) -> Result<(), MmsdError> {
        queries::messages::create_message(self.db()?, msg).await
    }

    async fn put(&self, msg: &Message) -> Result<(), MmsdError> {
        queries::messages::put_message(self.db()?, msg).await
    }

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, MmsdError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, MmsdError> {
        queries::messages::list_messages(self.db()?, filter).await
    }

    async fn delete(&self, id: &MessageId) -> Result<bool, MmsdError> {
        queries::messages::delete_message(self.db()?, id).await
    }
}
