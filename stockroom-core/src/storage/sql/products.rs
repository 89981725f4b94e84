//! SqliteProductStore - products and sales, aggregated with a join.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE products (
//!     product_id   TEXT PRIMARY KEY,
//!     name         TEXT NOT NULL,
//!     cost         INTEGER NOT NULL,
//!     quantity     INTEGER NOT NULL,
//!     date_created TEXT NOT NULL,
//!     date_updated TEXT NOT NULL,
//!     user_id      TEXT NOT NULL
//! );
//! CREATE TABLE sales (
//!     sale_id      TEXT PRIMARY KEY,
//!     product_id   TEXT NOT NULL REFERENCES products(product_id) ON DELETE CASCADE,
//!     quantity     INTEGER NOT NULL,
//!     paid         INTEGER NOT NULL,
//!     date_created TEXT NOT NULL
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use super::{is_foreign_key_violation, ping, unavailable};
use crate::auth::{self, Claims};
use crate::model::{NewProduct, NewSale, Product, Sale, UpdateProduct};
use crate::storage::backend::{ProductStorage, StatusChecker};
use crate::storage::error::{new_id, parse_id, StorageError, StorageResult};

/// Products with `sold`/`revenue` folded in from sales, zero when none exist.
const PRODUCT_SELECT: &str = "SELECT \
        p.product_id, p.name, p.cost, p.quantity, p.user_id, \
        p.date_created, p.date_updated, \
        COALESCE(SUM(s.quantity), 0) AS sold, \
        COALESCE(SUM(s.paid), 0) AS revenue \
    FROM products AS p \
    LEFT JOIN sales AS s ON p.product_id = s.product_id";

const SALE_COLUMNS: &str = "sale_id, product_id, quantity, paid, date_created";

// =============================================================================
// SqliteProductStore
// =============================================================================

/// Relational product and sale storage.
#[derive(Debug, Clone)]
pub struct SqliteProductStore {
    pool: SqlitePool,
}

impl SqliteProductStore {
    /// Wrap an open pool. The schema must already be migrated.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM products WHERE product_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable(&format!("checking product {id}"), &e))?;
        Ok(found.is_some())
    }
}

/// Convert a joined row to a Product.
fn row_to_product(row: &SqliteRow) -> StorageResult<Product> {
    let column = |e: sqlx::Error| StorageError::unavailable(format!("decoding product row: {e}"));

    Ok(Product {
        id: row.try_get("product_id").map_err(column)?,
        name: row.try_get("name").map_err(column)?,
        cost: row.try_get("cost").map_err(column)?,
        quantity: row.try_get("quantity").map_err(column)?,
        sold: row.try_get("sold").map_err(column)?,
        revenue: row.try_get("revenue").map_err(column)?,
        user_id: row.try_get("user_id").map_err(column)?,
        date_created: row.try_get("date_created").map_err(column)?,
        date_updated: row.try_get("date_updated").map_err(column)?,
    })
}

/// Convert a database row to a Sale.
fn row_to_sale(row: &SqliteRow) -> StorageResult<Sale> {
    let column = |e: sqlx::Error| StorageError::unavailable(format!("decoding sale row: {e}"));

    Ok(Sale {
        id: row.try_get("sale_id").map_err(column)?,
        product_id: row.try_get("product_id").map_err(column)?,
        quantity: row.try_get("quantity").map_err(column)?,
        paid: row.try_get("paid").map_err(column)?,
        date_created: row.try_get("date_created").map_err(column)?,
    })
}

#[async_trait]
impl StatusChecker for SqliteProductStore {
    #[tracing::instrument(name = "product.sqlite.status_check", skip_all)]
    async fn status_check(&self) -> StorageResult<()> {
        ping(&self.pool).await
    }
}

#[async_trait]
impl ProductStorage for SqliteProductStore {
    #[tracing::instrument(name = "product.sqlite.list", skip_all)]
    async fn list(&self) -> StorageResult<Vec<Product>> {
        let sql = format!("{PRODUCT_SELECT} GROUP BY p.product_id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("selecting products", &e))?;

        rows.iter().map(row_to_product).collect()
    }

    #[tracing::instrument(name = "product.sqlite.retrieve", skip(self))]
    async fn retrieve(&self, id: &str) -> StorageResult<Product> {
        let id = parse_id(id)?;

        let sql = format!("{PRODUCT_SELECT} WHERE p.product_id = ? GROUP BY p.product_id");
        let row = sqlx::query(&sql)
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable(&format!("selecting product {id}"), &e))?;

        match row {
            Some(row) => row_to_product(&row),
            None => Err(StorageError::NotFound),
        }
    }

    #[tracing::instrument(
        name = "product.sqlite.create",
        skip(self, claims, new, now),
        fields(subject = %claims.subject)
    )]
    async fn create(
        &self,
        claims: &Claims,
        new: &NewProduct,
        now: DateTime<Utc>,
    ) -> StorageResult<Product> {
        let product = Product::from_new(new_id(), new, claims.subject.clone(), now);

        sqlx::query(
            "INSERT INTO products \
                (product_id, user_id, name, cost, quantity, date_created, date_updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&product.id)
        .bind(&product.user_id)
        .bind(&product.name)
        .bind(product.cost)
        .bind(product.quantity)
        .bind(product.date_created)
        .bind(product.date_updated)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("inserting product", &e))?;

        tracing::debug!(id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(
        name = "product.sqlite.update",
        skip(self, claims, patch, now),
        fields(subject = %claims.subject)
    )]
    async fn update(
        &self,
        claims: &Claims,
        id: &str,
        patch: &UpdateProduct,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let current = self.retrieve(id).await?;
        auth::authorize_product(claims, &current.user_id)?;

        // Only the columns the patch names are written.
        let result = sqlx::query(
            "UPDATE products SET \
                name = COALESCE(?, name), \
                cost = COALESCE(?, cost), \
                quantity = COALESCE(?, quantity), \
                date_updated = ? \
             WHERE product_id = ?",
        )
        .bind(patch.name.as_deref())
        .bind(patch.cost)
        .bind(patch.quantity)
        .bind(now)
        .bind(&current.id)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("updating product", &e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(name = "product.sqlite.delete", skip(self))]
    async fn delete(&self, id: &str) -> StorageResult<()> {
        let id = parse_id(id)?;

        // Sales go with the product through ON DELETE CASCADE.
        sqlx::query("DELETE FROM products WHERE product_id = ?")
            .bind(&id)
            .execute(&self.pool)
            .await
            .map_err(|e| unavailable(&format!("deleting product {id}"), &e))?;

        Ok(())
    }

    #[tracing::instrument(name = "product.sqlite.add_sale", skip(self, new, now))]
    async fn add_sale(
        &self,
        product_id: &str,
        new: &NewSale,
        now: DateTime<Utc>,
    ) -> StorageResult<Sale> {
        let product_id = parse_id(product_id)?;
        let sale = Sale::from_new(new_id(), product_id, new, now);

        let sql = format!("INSERT INTO sales ({SALE_COLUMNS}) VALUES (?, ?, ?, ?, ?)");
        sqlx::query(&sql)
            .bind(&sale.id)
            .bind(&sale.product_id)
            .bind(sale.quantity)
            .bind(sale.paid)
            .bind(sale.date_created)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StorageError::NotFound
                } else {
                    unavailable("inserting sale", &e)
                }
            })?;

        tracing::debug!(id = %sale.id, product_id = %sale.product_id, "sale recorded");
        Ok(sale)
    }

    #[tracing::instrument(name = "product.sqlite.list_sales", skip(self))]
    async fn list_sales(&self, product_id: &str) -> StorageResult<Vec<Sale>> {
        let product_id = parse_id(product_id)?;
        if !self.exists(&product_id).await? {
            return Err(StorageError::NotFound);
        }

        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE product_id = ?");
        let rows = sqlx::query(&sql)
            .bind(&product_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable(&format!("selecting sales of {product_id}"), &e))?;

        rows.iter().map(row_to_sale).collect()
    }
}
