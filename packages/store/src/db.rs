// ABOUTME: SQLite pool setup and the storage handles handlers share

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::catalog::CatalogStorage;
use crate::selections::SelectionStorage;
use crate::storage::StorageError;
use crate::users::UserStorage;

/// One pool, one storage handle per domain area.
#[derive(Clone)]
pub struct DbState {
    pub pool: SqlitePool,
    pub catalog: Arc<CatalogStorage>,
    pub selections: Arc<SelectionStorage>,
    pub users: Arc<UserStorage>,
}

impl DbState {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            catalog: Arc::new(CatalogStorage::new(pool.clone())),
            selections: Arc::new(SelectionStorage::new(pool.clone())),
            users: Arc::new(UserStorage::new(pool.clone())),
            pool,
        }
    }

    /// Cheap connectivity probe for readiness checks
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;
        Ok(())
    }

    /// Open (creating if missing) the database at `path` and run migrations
    pub async fn init_with_path(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", path.display());
        debug!(url = %database_url, "opening database");

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&database_url)
            .await
            .map_err(StorageError::Sqlx)?;

        // WAL keeps readers unblocked during writes; FK enforcement is off
        // by default in SQLite and the schema relies on cascades.
        for pragma in [
            "PRAGMA journal_mode = WAL",
            "PRAGMA foreign_keys = ON",
            "PRAGMA synchronous = NORMAL",
        ] {
            sqlx::query(pragma)
                .execute(&pool)
                .await
                .map_err(StorageError::Sqlx)?;
        }

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StorageError::Migration)?;

        info!(path = %path.display(), "database ready");

        Ok(Self::new(pool))
    }
}
