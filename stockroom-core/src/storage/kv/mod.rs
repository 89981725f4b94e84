//! KV backend - embedded adapter over sled.
//!
//! TigerStyle: everything the relational engine gives for free is rebuilt
//! here by hand, inside sled transactions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SledUserStore / SledProductStore             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  users tree     r:<id> record, e:<email> → id                │
//! │  products tree  r:<id> record                                │
//! │  sales tree     r:<id> record (folded into aggregates)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  uniqueness  → index lookup inside the insert transaction    │
//! │  aggregates  → full scan of sales on every product read      │
//! │  cascade     → product removal, then a batch sweep of sales  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! sled calls block, so every operation runs on the blocking pool.

pub(crate) mod codec;
pub(crate) mod keys;
mod products;
mod users;

use std::path::Path;
use std::time::{Duration, Instant};

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::{Db, Tree};

use super::error::{StorageError, StorageResult};
use crate::constants::{
    KV_META_FORMAT_KEY, KV_OPEN_RETRY_INTERVAL, KV_PARTITION_PRODUCTS, KV_PARTITION_SALES,
    KV_PARTITION_USERS, KV_RECORD_FORMAT_VERSION,
};

pub use products::SledProductStore;
pub use users::SledUserStore;

// =============================================================================
// KvStore
// =============================================================================

/// An open sled database with its three partitions.
///
/// Cloning is cheap; all clones share the same database.
#[derive(Debug, Clone)]
pub struct KvStore {
    db: Db,
    users: Tree,
    products: Tree,
    sales: Tree,
}

impl KvStore {
    /// Open (creating if missing) the database directory at `path`.
    ///
    /// sled holds an exclusive file lock per process. While another handle
    /// holds it, opening is retried until `timeout` has elapsed.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if the database cannot be opened in time.
    pub async fn open(path: &Path, timeout: Duration) -> StorageResult<Self> {
        let deadline = Instant::now() + timeout;

        loop {
            let attempt = path.to_path_buf();
            let opened = blocking(move || Ok(sled::Config::new().path(attempt).open())).await?;

            match opened {
                Ok(db) => {
                    let store = blocking(move || Self::from_db(db)).await?;
                    tracing::info!(path = %path.display(), "opened sled database");
                    return Ok(store);
                }
                Err(e) if is_lock_contention(&e) && Instant::now() < deadline => {
                    tracing::debug!(path = %path.display(), "sled database locked, retrying");
                    tokio::time::sleep(KV_OPEN_RETRY_INTERVAL).await;
                }
                Err(e) => {
                    return Err(StorageError::unavailable(format!(
                        "opening sled database at {}: {e}",
                        path.display()
                    )));
                }
            }
        }
    }

    /// Open a throwaway database that is removed when the last clone drops.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if sled cannot create it.
    pub fn temporary() -> StorageResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| sled_err("opening temporary sled database", &e))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let open = |name: &str| {
            db.open_tree(name)
                .map_err(|e| sled_err(&format!("opening partition {name}"), &e))
        };

        Ok(Self {
            users: open(KV_PARTITION_USERS)?,
            products: open(KV_PARTITION_PRODUCTS)?,
            sales: open(KV_PARTITION_SALES)?,
            db,
        })
    }

    pub(crate) fn users(&self) -> &Tree {
        &self.users
    }

    pub(crate) fn products(&self) -> &Tree {
        &self.products
    }

    pub(crate) fn sales(&self) -> &Tree {
        &self.sales
    }

    /// Record format version stamped by migration, if any.
    ///
    /// # Errors
    /// `StorageError::Unavailable` on a read failure.
    pub async fn format_version(&self) -> StorageResult<Option<u8>> {
        let db = self.db.clone();
        blocking(move || {
            let value = db
                .get(KV_META_FORMAT_KEY)
                .map_err(|e| sled_err("reading format version", &e))?;
            Ok(value.and_then(|v| v.first().copied()))
        })
        .await
    }

    /// Stamp the current record format version.
    pub(crate) async fn write_format_version(&self) -> StorageResult<()> {
        let db = self.db.clone();
        blocking(move || {
            db.insert(KV_META_FORMAT_KEY, vec![KV_RECORD_FORMAT_VERSION])
                .map_err(|e| sled_err("writing format version", &e))?;
            Ok(())
        })
        .await
    }

    /// Flush all dirty pages to disk.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if the flush fails.
    pub async fn flush(&self) -> StorageResult<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| sled_err("flushing sled database", &e))?;
        Ok(())
    }

    /// One read against the default partition.
    pub(crate) async fn ping(&self) -> StorageResult<()> {
        self.format_version().await.map(|_| ())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Outcome of a sled transaction closure; aborts carry a `StorageError`.
pub(crate) type TxResult<T> = ConflictableTransactionResult<T, StorageError>;

/// Run a blocking sled call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::unavailable(format!("sled task failed: {e}")))?
}

pub(crate) fn sled_err(context: &str, err: &sled::Error) -> StorageError {
    StorageError::unavailable(format!("{context}: {err}"))
}

/// Lift a fallible step inside a transaction into an abort.
pub(crate) fn aborting<T>(result: StorageResult<T>) -> TxResult<T> {
    result.map_err(ConflictableTransactionError::Abort)
}

/// Aborts carry the contract error through unchanged.
pub(crate) fn tx_err(context: &str, err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => sled_err(context, &e),
    }
}

fn is_lock_contention(err: &sled::Error) -> bool {
    matches!(err, sled::Error::Io(io) if io.to_string().contains("could not acquire lock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(&dir.path().join("kv"), Duration::from_secs(1))
            .await
            .unwrap();

        let names: Vec<Vec<u8>> = store.db.tree_names().into_iter().map(|n| n.to_vec()).collect();
        for partition in [KV_PARTITION_USERS, KV_PARTITION_PRODUCTS, KV_PARTITION_SALES] {
            assert!(names.contains(&partition.as_bytes().to_vec()), "missing {partition}");
        }
        assert_eq!(store.format_version().await.unwrap(), None);

        store.write_format_version().await.unwrap();
        assert_eq!(store.format_version().await.unwrap(), Some(KV_RECORD_FORMAT_VERSION));
    }

    #[test]
    fn test_tx_err_passes_aborts_through() {
        let err = tx_err("ctx", TransactionError::Abort(StorageError::NotFound));
        assert_eq!(err, StorageError::NotFound);
    }
}
