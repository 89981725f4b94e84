//! Storage - Contract, facade and the two backends.
//!
//! TigerStyle: callers hold a `Storage` and never learn which backend is
//! behind it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Storage                             │
//! │   validate payload ─→ dyn UserStorage / dyn ProductStorage   │
//! └─────────────────────────────────────────────────────────────┘
//!            ↓                                 ↓
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │ SqliteUserStore          │   │ SledUserStore                │
//! │ SqliteProductStore       │   │ SledProductStore             │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```

pub(crate) mod backend;
mod error;
pub(crate) mod kv;
pub(crate) mod sql;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::auth::Claims;
use crate::model::{
    NewProduct, NewSale, NewUser, Product, Sale, UpdateProduct, UpdateUser, User, Validate,
};

pub use backend::{ProductStorage, StatusChecker, UserStorage};
pub use error::{new_id, parse_id, StorageError, StorageResult};
pub use kv::{KvStore, SledProductStore, SledUserStore};
pub use sql::{open as open_sqlite, SqliteProductStore, SqliteUserStore};

// =============================================================================
// Storage
// =============================================================================

/// Backend-agnostic handle over both entity families.
///
/// Every payload is validated here, so a payload rejected by validation
/// reaches neither backend.
#[derive(Clone)]
pub struct Storage {
    users: Arc<dyn UserStorage>,
    products: Arc<dyn ProductStorage>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// Compose a handle from any pair of backend implementations.
    #[must_use]
    pub fn new(users: Arc<dyn UserStorage>, products: Arc<dyn ProductStorage>) -> Self {
        Self { users, products }
    }

    /// Relational backend over an open, migrated pool.
    #[must_use]
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self::new(
            Arc::new(SqliteUserStore::new(pool.clone())),
            Arc::new(SqliteProductStore::new(pool)),
        )
    }

    /// Embedded backend over an open store.
    #[must_use]
    pub fn sled(store: KvStore) -> Self {
        Self::new(
            Arc::new(SledUserStore::new(store.clone())),
            Arc::new(SledProductStore::new(store)),
        )
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// All users.
    ///
    /// # Errors
    /// `Unavailable` on a store failure.
    pub async fn list_users(&self) -> StorageResult<Vec<User>> {
        self.users.list().await
    }

    /// One user, subject to the user access policy.
    ///
    /// # Errors
    /// `InvalidId`, `Forbidden`, `NotFound` or `Unavailable`.
    pub async fn retrieve_user(&self, claims: &Claims, id: &str) -> StorageResult<User> {
        self.users.retrieve(claims, id).await
    }

    /// Validate and create a user.
    ///
    /// # Errors
    /// `Validation` for a bad payload or a taken email, else `Unavailable`.
    pub async fn create_user(&self, new: &NewUser, now: DateTime<Utc>) -> StorageResult<User> {
        new.validate()?;
        self.users.create(new, now).await
    }

    /// Validate and apply a user patch.
    ///
    /// # Errors
    /// `Validation`, `InvalidId`, `Forbidden`, `NotFound` or `Unavailable`.
    pub async fn update_user(
        &self,
        claims: &Claims,
        id: &str,
        patch: &UpdateUser,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        patch.validate()?;
        self.users.update(claims, id, patch, now).await
    }

    /// Remove a user. Removing an absent user succeeds.
    ///
    /// # Errors
    /// `InvalidId` or `Unavailable`.
    pub async fn delete_user(&self, id: &str) -> StorageResult<()> {
        self.users.delete(id).await
    }

    /// Exchange credentials for claims.
    ///
    /// # Errors
    /// `AuthenticationFailure` for any credential mismatch, else `Unavailable`.
    pub async fn authenticate(
        &self,
        now: DateTime<Utc>,
        email: &str,
        password: &str,
    ) -> StorageResult<Claims> {
        self.users.authenticate(now, email, password).await
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// All products with aggregates.
    ///
    /// # Errors
    /// `Unavailable` on a store failure.
    pub async fn list_products(&self) -> StorageResult<Vec<Product>> {
        self.products.list().await
    }

    /// One product with aggregates.
    ///
    /// # Errors
    /// `InvalidId`, `NotFound` or `Unavailable`.
    pub async fn retrieve_product(&self, id: &str) -> StorageResult<Product> {
        self.products.retrieve(id).await
    }

    /// Validate and create a product owned by the caller.
    ///
    /// # Errors
    /// `Validation` or `Unavailable`.
    pub async fn create_product(
        &self,
        claims: &Claims,
        new: &NewProduct,
        now: DateTime<Utc>,
    ) -> StorageResult<Product> {
        new.validate()?;
        self.products.create(claims, new, now).await
    }

    /// Validate and apply a product patch.
    ///
    /// # Errors
    /// `Validation`, `InvalidId`, `NotFound`, `Forbidden` or `Unavailable`.
    pub async fn update_product(
        &self,
        claims: &Claims,
        id: &str,
        patch: &UpdateProduct,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        patch.validate()?;
        self.products.update(claims, id, patch, now).await
    }

    /// Remove a product and its sales. Removing an absent product succeeds.
    ///
    /// # Errors
    /// `InvalidId` or `Unavailable`.
    pub async fn delete_product(&self, id: &str) -> StorageResult<()> {
        self.products.delete(id).await
    }

    /// Validate and record a sale.
    ///
    /// # Errors
    /// `Validation`, `InvalidId`, `NotFound` or `Unavailable`.
    pub async fn add_sale(
        &self,
        product_id: &str,
        new: &NewSale,
        now: DateTime<Utc>,
    ) -> StorageResult<Sale> {
        new.validate()?;
        self.products.add_sale(product_id, new, now).await
    }

    /// Sales of one product.
    ///
    /// # Errors
    /// `InvalidId`, `NotFound` or `Unavailable`.
    pub async fn list_sales(&self, product_id: &str) -> StorageResult<Vec<Sale>> {
        self.products.list_sales(product_id).await
    }

    /// Probe both families' stores.
    ///
    /// # Errors
    /// `Unavailable` if either store fails its round trip.
    pub async fn status_check(&self) -> StorageResult<()> {
        self.users.status_check().await?;
        self.products.status_check().await
    }
}
