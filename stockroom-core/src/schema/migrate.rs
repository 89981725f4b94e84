//! Migrations - ordered, embedded, checksummed.
//!
//! Entries are append-only. Once a version has run against a database its
//! statements must never change; the recorded checksum enforces that.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::{SchemaError, SchemaResult};
use crate::constants::KV_RECORD_FORMAT_VERSION;
use crate::storage::KvStore;

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Position in the sequence, starting at 1
    pub version: i64,
    /// Human summary
    pub description: &'static str,
    /// Statements run in order inside one transaction
    pub statements: &'static [&'static str],
}

/// The relational schema, oldest first.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Add products",
        statements: &["CREATE TABLE products (
                product_id   TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                cost         INTEGER NOT NULL,
                quantity     INTEGER NOT NULL,
                date_created TEXT NOT NULL,
                date_updated TEXT NOT NULL
            )"],
    },
    Migration {
        version: 2,
        description: "Add sales",
        statements: &[
            "CREATE TABLE sales (
                sale_id      TEXT PRIMARY KEY,
                product_id   TEXT NOT NULL REFERENCES products(product_id) ON DELETE CASCADE,
                quantity     INTEGER NOT NULL,
                paid         INTEGER NOT NULL,
                date_created TEXT NOT NULL
            )",
            "CREATE INDEX idx_sales_product_id ON sales(product_id)",
        ],
    },
    Migration {
        version: 3,
        description: "Add users",
        statements: &["CREATE TABLE users (
                user_id       TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                email         TEXT NOT NULL UNIQUE,
                roles         TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                date_created  TEXT NOT NULL,
                date_updated  TEXT NOT NULL
            )"],
    },
    Migration {
        version: 4,
        description: "Add user column to products",
        statements: &["ALTER TABLE products
                ADD COLUMN user_id TEXT NOT NULL DEFAULT '00000000-0000-0000-0000-000000000000'"],
    },
];

/// SHA-256 over a migration's statements, hex encoded.
#[must_use]
pub fn checksum(migration: &Migration) -> String {
    let mut hasher = Sha256::new();
    for statement in migration.statements {
        hasher.update(statement.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

// =============================================================================
// Relational
// =============================================================================

/// Apply pending migrations. Returns how many ran.
pub(super) async fn sqlite(pool: &SqlitePool) -> SchemaResult<usize> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            checksum    TEXT NOT NULL,
            applied_at  TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| SchemaError::Migration {
        version: 0,
        message: format!("creating schema_version: {e}"),
    })?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        if apply(pool, migration).await? {
            applied += 1;
        }
    }
    Ok(applied)
}

/// Run one migration unless already recorded. Returns whether it ran.
async fn apply(pool: &SqlitePool, migration: &Migration) -> SchemaResult<bool> {
    let version = migration.version;
    let failed = |e: sqlx::Error| SchemaError::Migration {
        version,
        message: e.to_string(),
    };
    let embedded = checksum(migration);

    let recorded: Option<String> =
        sqlx::query_scalar("SELECT checksum FROM schema_version WHERE version = ?")
            .bind(version)
            .fetch_optional(pool)
            .await
            .map_err(failed)?;

    match recorded {
        Some(recorded) if recorded == embedded => return Ok(false),
        Some(recorded) => {
            return Err(SchemaError::ChecksumMismatch {
                version,
                recorded,
                embedded,
            })
        }
        None => {}
    }

    let mut tx = pool.begin().await.map_err(failed)?;
    for statement in migration.statements {
        sqlx::query(statement).execute(&mut *tx).await.map_err(failed)?;
    }
    sqlx::query(
        "INSERT INTO schema_version (version, description, checksum, applied_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(version)
    .bind(migration.description)
    .bind(&embedded)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(failed)?;
    tx.commit().await.map_err(failed)?;

    tracing::info!(version, description = migration.description, "applied migration");
    Ok(true)
}

// =============================================================================
// Embedded
// =============================================================================

/// Partitions exist once the store is open; stamp or check the format version.
pub(super) async fn sled(store: &KvStore) -> SchemaResult<()> {
    match store.format_version().await? {
        Some(version) if version == KV_RECORD_FORMAT_VERSION => {}
        Some(version) => {
            return Err(SchemaError::Migration {
                version: i64::from(version),
                message: format!(
                    "record format version {version} is not readable, \
                     expected {KV_RECORD_FORMAT_VERSION}"
                ),
            })
        }
        None => store.write_format_version().await?,
    }
    store.flush().await?;
    Ok(())
}
