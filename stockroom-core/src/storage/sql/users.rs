//! SqliteUserStore - users table with engine-enforced email uniqueness.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE users (
//!     user_id       TEXT PRIMARY KEY,
//!     name          TEXT NOT NULL,
//!     email         TEXT NOT NULL UNIQUE,
//!     roles         TEXT NOT NULL,
//!     password_hash TEXT NOT NULL,
//!     date_created  TEXT NOT NULL,
//!     date_updated  TEXT NOT NULL
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use super::{decode_roles, encode_roles, is_unique_violation, ping, unavailable};
use crate::auth::{self, Claims};
use crate::model::{normalize_email, HashedPassword, NewUser, UpdateUser, User};
use crate::storage::backend::{self, StatusChecker, UserStorage};
use crate::storage::error::{new_id, parse_id, StorageError, StorageResult};

const USER_COLUMNS: &str =
    "user_id, name, email, roles, password_hash, date_created, date_updated";

// =============================================================================
// SqliteUserStore
// =============================================================================

/// Relational user storage.
#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Wrap an open pool. The schema must already be migrated.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable(&format!("selecting user {id:?}"), &e))?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn fetch_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("selecting user by email", &e))?;

        row.as_ref().map(row_to_user).transpose()
    }
}

/// Convert a database row to a User.
fn row_to_user(row: &SqliteRow) -> StorageResult<User> {
    let column = |e: sqlx::Error| StorageError::unavailable(format!("decoding user row: {e}"));

    let roles: String = row.try_get("roles").map_err(column)?;
    let password_hash: String = row.try_get("password_hash").map_err(column)?;
    let date_created: DateTime<Utc> = row.try_get("date_created").map_err(column)?;
    let date_updated: DateTime<Utc> = row.try_get("date_updated").map_err(column)?;

    Ok(User {
        id: row.try_get("user_id").map_err(column)?,
        name: row.try_get("name").map_err(column)?,
        email: row.try_get("email").map_err(column)?,
        roles: decode_roles(&roles)?,
        password_hash: HashedPassword::new(password_hash),
        date_created,
        date_updated,
    })
}

#[async_trait]
impl StatusChecker for SqliteUserStore {
    #[tracing::instrument(name = "user.sqlite.status_check", skip_all)]
    async fn status_check(&self) -> StorageResult<()> {
        ping(&self.pool).await
    }
}

#[async_trait]
impl UserStorage for SqliteUserStore {
    #[tracing::instrument(name = "user.sqlite.list", skip_all)]
    async fn list(&self) -> StorageResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("selecting users", &e))?;

        rows.iter().map(row_to_user).collect()
    }

    #[tracing::instrument(
        name = "user.sqlite.retrieve",
        skip(self, claims),
        fields(subject = %claims.subject)
    )]
    async fn retrieve(&self, claims: &Claims, id: &str) -> StorageResult<User> {
        let id = parse_id(id)?;
        auth::authorize_user(claims, &id)?;

        self.fetch_by_id(&id).await?.ok_or(StorageError::NotFound)
    }

    #[tracing::instrument(name = "user.sqlite.create", skip_all)]
    async fn create(&self, new: &NewUser, now: DateTime<Utc>) -> StorageResult<User> {
        let hash = backend::hash_password(&new.password).await?;
        let user = User::from_new(new_id(), new, hash, now);

        let sql = format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)");
        sqlx::query(&sql)
            .bind(&user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(encode_roles(&user.roles)?)
            .bind(user.password_hash.as_str())
            .bind(user.date_created)
            .bind(user.date_updated)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::email_taken()
                } else {
                    unavailable("inserting user", &e)
                }
            })?;

        tracing::debug!(id = %user.id, "user created");
        Ok(user)
    }

    #[tracing::instrument(
        name = "user.sqlite.update",
        skip(self, claims, patch, now),
        fields(subject = %claims.subject)
    )]
    async fn update(
        &self,
        claims: &Claims,
        id: &str,
        patch: &UpdateUser,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let id = parse_id(id)?;
        auth::authorize_user(claims, &id)?;
        if self.fetch_by_id(&id).await?.is_none() {
            return Err(StorageError::NotFound);
        }

        let hash = match &patch.password {
            Some(password) => Some(backend::hash_password(password).await?),
            None => None,
        };
        let roles = patch.roles.as_deref().map(encode_roles).transpose()?;
        let email = patch.email.as_deref().map(normalize_email);

        // Only the columns the patch names are written.
        let result = sqlx::query(
            "UPDATE users SET \
                name = COALESCE(?, name), \
                email = COALESCE(?, email), \
                roles = COALESCE(?, roles), \
                password_hash = COALESCE(?, password_hash), \
                date_updated = ? \
             WHERE user_id = ?",
        )
        .bind(patch.name.as_deref())
        .bind(email)
        .bind(roles)
        .bind(hash.as_ref().map(HashedPassword::as_str))
        .bind(now)
        .bind(&id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::email_taken()
            } else {
                unavailable("updating user", &e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(name = "user.sqlite.delete", skip(self))]
    async fn delete(&self, id: &str) -> StorageResult<()> {
        let id = parse_id(id)?;

        sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(&id)
            .execute(&self.pool)
            .await
            .map_err(|e| unavailable(&format!("deleting user {id}"), &e))?;

        Ok(())
    }

    #[tracing::instrument(name = "user.sqlite.authenticate", skip_all)]
    async fn authenticate(
        &self,
        now: DateTime<Utc>,
        email: &str,
        password: &str,
    ) -> StorageResult<Claims> {
        let user = self.fetch_by_email(&normalize_email(email)).await?;
        backend::check_credentials(user, password, now).await
    }
}
