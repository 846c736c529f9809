//! Schema partition store
//!
//! One SQLite database holds any number of independent models, each in its
//! own schema partition. A [`SchemaStore`] is the shared handle; a
//! [`Partition`] scopes every read and write to one schema id.

mod migrations;
mod partition;
mod registry;
mod session;
mod snapshot;

use std::path::Path;
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::{Result, SyncError};

pub use partition::Partition;
pub use registry::IdentityRegistry;
pub use session::Session;
pub use snapshot::{Collection, DanglingReference, Snapshot};

/// Handle to the shared relational store
#[derive(Debug, Clone)]
pub struct SchemaStore {
    pool: SqlitePool,
}

impl SchemaStore {
    /// Open (creating if needed) a store backed by a SQLite file
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| SyncError::StoreLocation {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        log::info!("Opened partition store at {}", path.display());
        Self::from_pool(pool).await
    }

    /// A private in-memory store
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep exactly one alive
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        migrations::run(&pool).await?;
        Ok(SchemaStore { pool })
    }

    /// Scope to one schema partition
    pub fn partition(&self, schema_id: impl Into<String>) -> Partition {
        Partition::new(self.pool.clone(), schema_id.into())
    }

    /// Durable GUID registry shared by all partitions
    pub fn registry(&self) -> IdentityRegistry {
        IdentityRegistry::new(self.pool.clone())
    }

    /// Schema ids that currently hold at least one entity
    pub async fn schemas(&self) -> Result<Vec<String>> {
        let schemas: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT schema_id FROM model_entities ORDER BY schema_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(schemas)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("models.db");

        let store = SchemaStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert!(store.schemas().await.unwrap().is_empty());
        store.close().await;
    }

    #[tokio::test]
    async fn test_open_reports_unusable_parent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let result = SchemaStore::open(&blocker.join("sub").join("models.db")).await;
        match result {
            Err(SyncError::StoreLocation { path, .. }) => assert!(path.contains("blocker")),
            other => panic!("expected a store location error, got {:?}", other.map(|_| ())),
        }
    }
}
