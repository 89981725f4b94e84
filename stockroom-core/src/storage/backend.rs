//! Storage contract - the operation set every backend implements identically.
//!
//! TigerStyle: callers depend on these traits, never on a concrete backend.
//! Payloads are assumed validated; the `Storage` facade guarantees it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::{StorageError, StorageResult};
use crate::auth::{self, Claims};
use crate::model::{
    HashedPassword, NewProduct, NewSale, NewUser, Product, Sale, UpdateProduct, UpdateUser, User,
};

/// Cheap liveness probe of the backing store.
#[async_trait]
pub trait StatusChecker: Send + Sync {
    /// Returns `Ok(())` if the store answers a round trip.
    async fn status_check(&self) -> StorageResult<()>;
}

/// User storage (identity and authentication).
#[async_trait]
pub trait UserStorage: StatusChecker {
    /// All users, in backend-natural order.
    async fn list(&self) -> StorageResult<Vec<User>>;

    /// One user. Non-privileged callers may only retrieve themselves.
    async fn retrieve(&self, claims: &Claims, id: &str) -> StorageResult<User>;

    /// Assign ID and timestamps, hash the password and persist.
    async fn create(&self, new: &NewUser, now: DateTime<Utc>) -> StorageResult<User>;

    /// Load, authorize, apply the patch and persist.
    async fn update(
        &self,
        claims: &Claims,
        id: &str,
        patch: &UpdateUser,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Idempotent removal.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Verify credentials and issue claims valid from `now`.
    async fn authenticate(
        &self,
        now: DateTime<Utc>,
        email: &str,
        password: &str,
    ) -> StorageResult<Claims>;
}

/// Product and sale storage (inventory and rollups).
#[async_trait]
pub trait ProductStorage: StatusChecker {
    /// All products with aggregates, in backend-natural order.
    async fn list(&self) -> StorageResult<Vec<Product>>;

    /// One product with aggregates. Unrestricted.
    async fn retrieve(&self, id: &str) -> StorageResult<Product>;

    /// Assign ID and timestamps and persist, owned by `claims.subject`.
    async fn create(
        &self,
        claims: &Claims,
        new: &NewProduct,
        now: DateTime<Utc>,
    ) -> StorageResult<Product>;

    /// Load, authorize against the owner, apply the patch and persist.
    async fn update(
        &self,
        claims: &Claims,
        id: &str,
        patch: &UpdateProduct,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Idempotent removal; the product's sales go with it.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Record a sale of an existing product.
    async fn add_sale(
        &self,
        product_id: &str,
        new: &NewSale,
        now: DateTime<Utc>,
    ) -> StorageResult<Sale>;

    /// Sales of an existing product.
    async fn list_sales(&self, product_id: &str) -> StorageResult<Vec<Sale>>;
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Hash a password on the blocking pool; argon2 is deliberately slow.
pub(crate) async fn hash_password(password: &str) -> StorageResult<HashedPassword> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| StorageError::unavailable(format!("hashing task failed: {e}")))?
        .map(HashedPassword::new)
}

/// Turn an email lookup result into claims or a uniform failure.
///
/// Unknown email and wrong password cost the same and fail the same way.
pub(crate) async fn check_credentials(
    user: Option<User>,
    password: &str,
    now: DateTime<Utc>,
) -> StorageResult<Claims> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || {
        let Some(user) = user else {
            auth::verify_unknown_user(&password);
            return Err(StorageError::AuthenticationFailure);
        };
        if !auth::verify_password(&password, user.password_hash.as_str()) {
            return Err(StorageError::AuthenticationFailure);
        }
        Ok(Claims::issue(user.id, user.roles, now))
    })
    .await
    .map_err(|e| StorageError::unavailable(format!("verification task failed: {e}")))?
}
