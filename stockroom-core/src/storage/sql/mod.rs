//! SQL backend - relational adapter over SQLite via sqlx.
//!
//! TigerStyle: the engine does the hard parts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SqliteUserStore / SqliteProductStore         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pool: sqlx::SqlitePool (WAL, foreign_keys = ON)             │
//! │  users.email UNIQUE          → duplicate email rejection     │
//! │  LEFT JOIN sales GROUP BY    → sold / revenue                │
//! │  sales ON DELETE CASCADE     → product delete cleanup        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! No locks are taken here. Isolation is whatever the engine provides.

mod products;
mod users;

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use super::error::{StorageError, StorageResult};
use crate::auth::Role;
use crate::constants::SQL_POOL_CONNECTIONS_MAX;

pub use products::SqliteProductStore;
pub use users::SqliteUserStore;

/// Open (creating if missing) a SQLite database file.
///
/// `timeout` bounds both acquiring a pooled connection and waiting on a
/// locked database.
///
/// # Errors
/// `StorageError::Unavailable` if the database cannot be opened in time.
pub async fn open(path: &Path, timeout: Duration) -> StorageResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(SQL_POOL_CONNECTIONS_MAX)
        .acquire_timeout(timeout)
        .connect_with(options)
        .await
        .map_err(|e| StorageError::unavailable(format!("connecting to sqlite: {e}")))?;

    tracing::info!(path = %path.display(), "opened sqlite database");
    Ok(pool)
}

/// Round trip to the engine.
pub(crate) async fn ping(pool: &SqlitePool) -> StorageResult<()> {
    let _: i64 = sqlx::query_scalar("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| unavailable("status check", &e))?;
    Ok(())
}

// =============================================================================
// Error Mapping
// =============================================================================

fn unavailable(context: &str, err: &sqlx::Error) -> StorageError {
    StorageError::unavailable(format!("{context}: {err}"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

// =============================================================================
// Column Encoding
// =============================================================================

/// Roles are stored as a JSON array of role names.
pub(crate) fn encode_roles(roles: &[Role]) -> StorageResult<String> {
    serde_json::to_string(roles)
        .map_err(|e| StorageError::unavailable(format!("encoding roles: {e}")))
}

fn decode_roles(raw: &str) -> StorageResult<Vec<Role>> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::unavailable(format!("decoding roles {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_column_roundtrip() {
        let raw = encode_roles(&[Role::Admin, Role::User]).unwrap();
        assert_eq!(raw, r#"["admin","user"]"#);
        assert_eq!(decode_roles(&raw).unwrap(), vec![Role::Admin, Role::User]);
        assert!(decode_roles("{ADMIN,USER}").is_err());
    }
}
