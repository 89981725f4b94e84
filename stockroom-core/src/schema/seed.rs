//! Seed data - a fixed, deterministic starting set.
//!
//! Every record has a fixed ID and timestamp and is written only if absent.
//! Passwords are hashed at seed time, so the stored hashes differ between
//! runs but every seeded account accepts `SEED_PASSWORD`.

use chrono::{DateTime, TimeZone, Utc};
use sled::Transactional;
use sqlx::SqlitePool;

use super::SchemaResult;
use crate::auth::Role;
use crate::model::{NewProduct, NewSale, NewUser, Product, Sale, User};
use crate::storage::backend::hash_password;
use crate::storage::kv::codec::{self, ProductRecord, SaleRecord, UserRecord};
use crate::storage::kv::keys::{email_key, record_key};
use crate::storage::kv::{blocking, tx_err, TxResult};
use crate::storage::sql::encode_roles;
use crate::storage::{KvStore, StorageError, StorageResult};

/// Password of every seeded account.
pub const SEED_PASSWORD: &str = "gophers";

/// Seeded administrator.
pub const SEED_ADMIN_ID: &str = "5cf37266-3473-4006-984f-9325122678b7";

/// Seeded regular user.
pub const SEED_USER_ID: &str = "45b5fbd3-755f-4379-8f07-a58d4a30fa2f";

/// Seeded product with two sales.
pub const SEED_PRODUCT_COMIC_BOOKS_ID: &str = "a2b0639f-2cc6-44b8-b97b-15d69dbb511e";

/// Seeded product with one sale.
pub const SEED_PRODUCT_TOYS_ID: &str = "72f8b983-3eb4-48db-9ed0-e45cc6bd716b";

/// 2019-03-24T00:00:00Z
const SEED_TIMESTAMP_SECS: i64 = 1_553_385_600;

/// (id, product id, quantity, paid)
const SEED_SALES: [(&str, &str, i64, i64); 3] = [
    ("98b6d4b8-f04b-4c79-8c2e-a0aef46854b7", SEED_PRODUCT_COMIC_BOOKS_ID, 2, 100),
    ("85f6fb09-eb05-4874-ae39-82d1a30fe0d7", SEED_PRODUCT_COMIC_BOOKS_ID, 5, 250),
    ("a235be9e-ab5d-44e6-a987-fa1c749264c7", SEED_PRODUCT_TOYS_ID, 3, 225),
];

/// The seed set as canonical records.
pub(super) struct SeedData {
    users: Vec<User>,
    products: Vec<Product>,
    sales: Vec<Sale>,
}

impl SeedData {
    /// Build the records, hashing each account's password.
    pub(super) async fn build() -> StorageResult<Self> {
        let at = seed_timestamp()?;

        let accounts = [
            (SEED_ADMIN_ID, "Admin Gopher", "admin@example.com", vec![Role::Admin, Role::User]),
            (SEED_USER_ID, "User Gopher", "user@example.com", vec![Role::User]),
        ];
        let mut users = Vec::with_capacity(accounts.len());
        for (id, name, email, roles) in accounts {
            let new = NewUser {
                name: name.to_string(),
                email: email.to_string(),
                roles,
                password: SEED_PASSWORD.to_string(),
                password_confirm: SEED_PASSWORD.to_string(),
            };
            let hash = hash_password(SEED_PASSWORD).await?;
            users.push(User::from_new(id.to_string(), &new, hash, at));
        }

        let products: Vec<Product> = [
            (SEED_PRODUCT_COMIC_BOOKS_ID, "Comic Books", 50, 42),
            (SEED_PRODUCT_TOYS_ID, "McDonalds Toys", 75, 120),
        ]
        .into_iter()
        .map(|(id, name, cost, quantity)| {
            let new = NewProduct {
                name: name.to_string(),
                cost,
                quantity,
            };
            Product::from_new(id.to_string(), &new, SEED_ADMIN_ID.to_string(), at)
        })
        .collect();

        let sales: Vec<Sale> = SEED_SALES
            .into_iter()
            .map(|(id, product_id, quantity, paid)| {
                Sale::from_new(
                    id.to_string(),
                    product_id.to_string(),
                    &NewSale { quantity, paid },
                    at,
                )
            })
            .collect();

        Ok(Self {
            users,
            products,
            sales,
        })
    }
}

fn seed_timestamp() -> StorageResult<DateTime<Utc>> {
    Utc.timestamp_opt(SEED_TIMESTAMP_SECS, 0)
        .single()
        .ok_or_else(|| StorageError::unavailable("seed timestamp out of range"))
}

// =============================================================================
// Relational
// =============================================================================

/// Insert missing seed rows in one transaction.
pub(super) async fn sqlite(pool: &SqlitePool, data: &SeedData) -> SchemaResult<()> {
    let failed = |e: sqlx::Error| StorageError::unavailable(format!("seeding sqlite: {e}"));
    let mut tx = pool.begin().await.map_err(failed)?;

    for user in &data.users {
        let roles = encode_roles(&user.roles)?;
        sqlx::query(
            "INSERT INTO users \
                (user_id, name, email, roles, password_hash, date_created, date_updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(roles)
        .bind(user.password_hash.as_str())
        .bind(user.date_created)
        .bind(user.date_updated)
        .execute(&mut *tx)
        .await
        .map_err(failed)?;
    }

    for product in &data.products {
        sqlx::query(
            "INSERT INTO products \
                (product_id, user_id, name, cost, quantity, date_created, date_updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(&product.id)
        .bind(&product.user_id)
        .bind(&product.name)
        .bind(product.cost)
        .bind(product.quantity)
        .bind(product.date_created)
        .bind(product.date_updated)
        .execute(&mut *tx)
        .await
        .map_err(failed)?;
    }

    for sale in &data.sales {
        sqlx::query(
            "INSERT INTO sales (sale_id, product_id, quantity, paid, date_created) \
             VALUES (?, ?, ?, ?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(&sale.id)
        .bind(&sale.product_id)
        .bind(sale.quantity)
        .bind(sale.paid)
        .bind(sale.date_created)
        .execute(&mut *tx)
        .await
        .map_err(failed)?;
    }

    tx.commit().await.map_err(failed)?;
    Ok(())
}

// =============================================================================
// Embedded
// =============================================================================

/// Insert missing seed records across all three partitions in one transaction.
pub(super) async fn sled(store: &KvStore, data: SeedData) -> SchemaResult<()> {
    let mut users = Vec::with_capacity(data.users.len());
    for user in &data.users {
        users.push((
            record_key(&user.id),
            email_key(&user.email),
            user.id.clone(),
            codec::encode(&UserRecord::from(user))?,
        ));
    }
    let mut products = Vec::with_capacity(data.products.len());
    for product in &data.products {
        products.push((record_key(&product.id), codec::encode(&ProductRecord::from(product))?));
    }
    let mut sales = Vec::with_capacity(data.sales.len());
    for sale in &data.sales {
        sales.push((record_key(&sale.id), codec::encode(&SaleRecord::from(sale))?));
    }

    let trees = (
        store.users().clone(),
        store.products().clone(),
        store.sales().clone(),
    );

    blocking(move || {
        let (user_tree, product_tree, sale_tree) = &trees;
        (user_tree, product_tree, sale_tree)
            .transaction(|(tx_users, tx_products, tx_sales)| -> TxResult<()> {
                for (rkey, ekey, id, record) in &users {
                    // A user whose email is already indexed is skipped whole.
                    if tx_users.get(rkey.as_slice())?.is_some()
                        || tx_users.get(ekey.as_slice())?.is_some()
                    {
                        continue;
                    }
                    tx_users.insert(rkey.as_slice(), record.as_slice())?;
                    tx_users.insert(ekey.as_slice(), id.as_bytes())?;
                }
                for (key, record) in &products {
                    if tx_products.get(key.as_slice())?.is_none() {
                        tx_products.insert(key.as_slice(), record.as_slice())?;
                    }
                }
                for (key, record) in &sales {
                    if tx_sales.get(key.as_slice())?.is_none() {
                        tx_sales.insert(key.as_slice(), record.as_slice())?;
                    }
                }
                Ok(())
            })
            .map_err(|e| tx_err("seeding sled", e))
    })
    .await?;

    store.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_timestamp() {
        let at = seed_timestamp().unwrap();
        assert_eq!(at.to_rfc3339(), "2019-03-24T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_seed_data_shape() {
        let data = SeedData::build().await.unwrap();

        assert_eq!(data.users.len(), 2);
        assert!(data.users[0].has_role(Role::Admin));
        assert!(!data.users[1].has_role(Role::Admin));
        assert!(data.products.iter().all(|p| p.user_id == SEED_ADMIN_ID));

        let comic_sales: i64 = data
            .sales
            .iter()
            .filter(|s| s.product_id == SEED_PRODUCT_COMIC_BOOKS_ID)
            .map(|s| s.quantity)
            .sum();
        assert_eq!(comic_sales, 7);
    }
}
