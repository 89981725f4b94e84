//! Schema - bootstrap shared by both backends.
//!
//! TigerStyle: idempotent. Running `migrate` or `seed` twice leaves the store
//! exactly as running it once.
//!
//! Both entry points dispatch on the `DatabaseHandle` tag. Backends are
//! selected by name only in `BackendKind::from_str`, which is where an
//! unsupported backend is rejected.

mod migrate;
mod seed;

use crate::database::DatabaseHandle;
use crate::storage::StorageError;

pub use migrate::{checksum, Migration, MIGRATIONS};
pub use seed::{
    SEED_ADMIN_ID, SEED_PASSWORD, SEED_PRODUCT_COMIC_BOOKS_ID, SEED_PRODUCT_TOYS_ID,
    SEED_USER_ID,
};

/// Errors from bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// An applied migration no longer matches its recorded checksum
    #[error("migration {version} checksum mismatch: recorded {recorded}, embedded {embedded}")]
    ChecksumMismatch {
        /// Migration version
        version: i64,
        /// Checksum stored when it was applied
        recorded: String,
        /// Checksum of the embedded statements
        embedded: String,
    },

    /// A migration step failed
    #[error("migration {version} failed: {message}")]
    Migration {
        /// Migration version (0 for the bookkeeping table)
        version: i64,
        /// Failure detail
        message: String,
    },

    /// Store-level failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for bootstrap.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Bring the store's schema up to date.
///
/// # Errors
/// `SchemaError` if a migration fails or was altered after being applied.
pub async fn migrate(handle: &DatabaseHandle) -> SchemaResult<()> {
    match handle {
        DatabaseHandle::Sqlite(pool) => {
            let applied = migrate::sqlite(pool).await?;
            tracing::info!(backend = "sqlite", applied, "schema migrated");
        }
        DatabaseHandle::Sled(store) => {
            migrate::sled(store).await?;
            tracing::info!(backend = "sled", "schema migrated");
        }
    }
    Ok(())
}

/// Insert the fixed seed records that are not already present.
///
/// The schema must already be migrated.
///
/// # Errors
/// `SchemaError::Storage` if a write fails.
pub async fn seed(handle: &DatabaseHandle) -> SchemaResult<()> {
    let data = seed::SeedData::build().await?;
    match handle {
        DatabaseHandle::Sqlite(pool) => seed::sqlite(pool, &data).await?,
        DatabaseHandle::Sled(store) => seed::sled(store, data).await?,
    }
    tracing::info!(backend = %handle.kind(), "seed data applied");
    Ok(())
}
