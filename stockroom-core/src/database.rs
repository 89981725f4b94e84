//! DatabaseHandle - an open store, tagged with its backend.
//!
//! Bootstrap (`schema::migrate`, `schema::seed`) dispatches on the tag; the
//! storage facade is built from it.

use sqlx::SqlitePool;

use crate::config::{BackendKind, StoreConfig};
use crate::storage::{self, KvStore, Storage, StorageResult};

/// An open backend.
#[derive(Debug, Clone)]
pub enum DatabaseHandle {
    /// Relational backend
    Sqlite(SqlitePool),
    /// Embedded KV backend
    Sled(KvStore),
}

impl DatabaseHandle {
    /// Open the backend `config` selects, within its timeout.
    ///
    /// Parent directories of the target path are created if missing.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if the store cannot be opened.
    pub async fn open(config: &StoreConfig) -> StorageResult<Self> {
        match config.backend {
            BackendKind::Sqlite => {
                create_parent(&config.sql_path)?;
                let pool = storage::open_sqlite(&config.sql_path, config.open_timeout).await?;
                Ok(Self::Sqlite(pool))
            }
            BackendKind::Sled => {
                create_parent(&config.kv_path)?;
                let store = KvStore::open(&config.kv_path, config.open_timeout).await?;
                Ok(Self::Sled(store))
            }
        }
    }

    /// Which backend this is.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Sqlite(_) => BackendKind::Sqlite,
            Self::Sled(_) => BackendKind::Sled,
        }
    }

    /// Storage facade over this handle.
    #[must_use]
    pub fn storage(&self) -> Storage {
        match self {
            Self::Sqlite(pool) => Storage::sqlite(pool.clone()),
            Self::Sled(store) => Storage::sled(store.clone()),
        }
    }

    /// Release the backend. Pending sled writes are flushed first.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if the final flush fails.
    pub async fn close(self) -> StorageResult<()> {
        match self {
            Self::Sqlite(pool) => {
                pool.close().await;
                Ok(())
            }
            Self::Sled(store) => store.flush().await,
        }
    }
}

fn create_parent(path: &std::path::Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| {
                storage::StorageError::unavailable(format!(
                    "creating directory {}: {e}",
                    parent.display()
                ))
            }),
        _ => Ok(()),
    }
}
