//! SledProductStore - products and sales without joins.
//!
//! There is no index of sales by product. Every product read scans the whole
//! sales partition and folds quantities and amounts per product ID, which
//! reproduces the relational LEFT JOIN with zero defaults.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::transaction::abort;
use sled::{Batch, Transactional, Tree};

use super::codec::{self, ProductRecord, SaleRecord};
use super::keys::{record_key, RECORD_PREFIX};
use super::{aborting, blocking, sled_err, tx_err, KvStore, TxResult};
use crate::auth::{self, Claims};
use crate::model::{NewProduct, NewSale, Product, Sale, UpdateProduct};
use crate::storage::backend::{ProductStorage, StatusChecker};
use crate::storage::error::{new_id, parse_id, StorageError, StorageResult};

/// Units sold and amount paid, per product ID.
type SalesTotals = HashMap<String, (i64, i64)>;

// =============================================================================
// SledProductStore
// =============================================================================

/// Embedded product and sale storage.
#[derive(Debug, Clone)]
pub struct SledProductStore {
    store: KvStore,
}

impl SledProductStore {
    /// Wrap an open store.
    #[must_use]
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }
}

// =============================================================================
// Scans
// =============================================================================

/// Decode every sale record in the partition.
fn scan_sales(sales: &Tree) -> StorageResult<Vec<SaleRecord>> {
    sales
        .scan_prefix(RECORD_PREFIX)
        .values()
        .map(|value| {
            let value = value.map_err(|e| sled_err("scanning sales", &e))?;
            codec::decode::<SaleRecord>(&value)
        })
        .collect()
}

/// Fold sales into per-product totals, for every product or just `only`.
///
/// A sum that leaves `i64` is `Unavailable`, as the relational `SUM` is.
fn sales_totals(sales: &Tree, only: Option<&str>) -> StorageResult<SalesTotals> {
    let mut totals = SalesTotals::new();
    for sale in scan_sales(sales)? {
        if only.is_some_and(|id| id != sale.product_id()) {
            continue;
        }
        let (quantity, paid) = sale.totals();
        let entry = totals.entry(sale.product_id().to_owned()).or_insert((0, 0));
        match (entry.0.checked_add(quantity), entry.1.checked_add(paid)) {
            (Some(sold), Some(revenue)) => *entry = (sold, revenue),
            _ => {
                return Err(StorageError::unavailable(format!(
                    "aggregate overflow summing sales of product {}",
                    sale.product_id()
                )))
            }
        }
    }
    Ok(totals)
}

fn decode_product(bytes: &[u8], totals: &SalesTotals) -> StorageResult<Product> {
    let mut product = codec::decode::<ProductRecord>(bytes)?.into_product()?;
    if let Some(&(quantity, paid)) = totals.get(&product.id) {
        product.add_sale(quantity, paid);
    }
    Ok(product)
}

fn product_exists(products: &Tree, id: &str) -> StorageResult<bool> {
    products
        .contains_key(record_key(id))
        .map_err(|e| sled_err(&format!("reading product {id}"), &e))
}

#[async_trait]
impl StatusChecker for SledProductStore {
    #[tracing::instrument(name = "product.sled.status_check", skip_all)]
    async fn status_check(&self) -> StorageResult<()> {
        self.store.ping().await
    }
}

#[async_trait]
impl ProductStorage for SledProductStore {
    #[tracing::instrument(name = "product.sled.list", skip_all)]
    async fn list(&self) -> StorageResult<Vec<Product>> {
        let products = self.store.products().clone();
        let sales = self.store.sales().clone();

        blocking(move || {
            let totals = sales_totals(&sales, None)?;
            products
                .scan_prefix(RECORD_PREFIX)
                .values()
                .map(|value| {
                    let value = value.map_err(|e| sled_err("scanning products", &e))?;
                    decode_product(&value, &totals)
                })
                .collect()
        })
        .await
    }

    #[tracing::instrument(name = "product.sled.retrieve", skip(self))]
    async fn retrieve(&self, id: &str) -> StorageResult<Product> {
        let id = parse_id(id)?;
        let products = self.store.products().clone();
        let sales = self.store.sales().clone();

        blocking(move || {
            let value = products
                .get(record_key(&id))
                .map_err(|e| sled_err(&format!("reading product {id}"), &e))?
                .ok_or(StorageError::NotFound)?;

            let totals = sales_totals(&sales, Some(id.as_str()))?;
            decode_product(&value, &totals)
        })
        .await
    }

    #[tracing::instrument(
        name = "product.sled.create",
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
        let record = codec::encode(&ProductRecord::from(&product))?;
        let products = self.store.products().clone();
        let key = record_key(&product.id);

        blocking(move || {
            products
                .insert(key, record)
                .map_err(|e| sled_err("inserting product", &e))?;
            Ok(())
        })
        .await?;

        tracing::debug!(id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(
        name = "product.sled.update",
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
        let id = parse_id(id)?;
        let claims = claims.clone();
        let patch = patch.clone();
        let products = self.store.products().clone();

        blocking(move || {
            let key = record_key(&id);

            products
                .transaction(|tx| -> TxResult<()> {
                    let Some(current) = tx.get(key.as_slice())? else {
                        return abort(StorageError::NotFound);
                    };
                    let record = aborting(codec::decode::<ProductRecord>(&current))?;
                    let mut product = aborting(record.into_product())?;
                    aborting(auth::authorize_product(&claims, &product.user_id))?;

                    product.apply(&patch, now);

                    let record = aborting(codec::encode(&ProductRecord::from(&product)))?;
                    tx.insert(key.as_slice(), record)?;
                    Ok(())
                })
                .map_err(|e| tx_err("updating product", e))
        })
        .await
    }

    #[tracing::instrument(name = "product.sled.delete", skip(self))]
    async fn delete(&self, id: &str) -> StorageResult<()> {
        let id = parse_id(id)?;
        let products = self.store.products().clone();
        let sales = self.store.sales().clone();

        let swept = blocking(move || {
            products
                .remove(record_key(&id))
                .map_err(|e| sled_err(&format!("deleting product {id}"), &e))?;

            // Cascade. Runs even when the product was already gone so that
            // sales left behind by an interrupted delete are collected.
            let mut batch = Batch::default();
            let mut swept = 0_usize;
            for entry in sales.scan_prefix(RECORD_PREFIX) {
                let (key, value) = entry.map_err(|e| sled_err("scanning sales", &e))?;
                let sale = codec::decode::<SaleRecord>(&value)?;
                if sale.product_id() == id {
                    batch.remove(key);
                    swept += 1;
                }
            }
            sales
                .apply_batch(batch)
                .map_err(|e| sled_err(&format!("deleting sales of {id}"), &e))?;
            Ok(swept)
        })
        .await?;

        tracing::debug!(swept, "product deleted");
        Ok(())
    }

    #[tracing::instrument(name = "product.sled.add_sale", skip(self, new, now))]
    async fn add_sale(
        &self,
        product_id: &str,
        new: &NewSale,
        now: DateTime<Utc>,
    ) -> StorageResult<Sale> {
        let product_id = parse_id(product_id)?;
        let sale = Sale::from_new(new_id(), product_id, new, now);
        let record = codec::encode(&SaleRecord::from(&sale))?;
        let products = self.store.products().clone();
        let sales = self.store.sales().clone();
        let product_key = record_key(&sale.product_id);
        let sale_key = record_key(&sale.id);

        blocking(move || {
            // Existence check and insert see the same snapshot.
            (&products, &sales)
                .transaction(|(products, sales)| -> TxResult<()> {
                    if products.get(product_key.as_slice())?.is_none() {
                        return abort(StorageError::NotFound);
                    }
                    sales.insert(sale_key.as_slice(), record.as_slice())?;
                    Ok(())
                })
                .map_err(|e| tx_err("inserting sale", e))
        })
        .await?;

        tracing::debug!(id = %sale.id, product_id = %sale.product_id, "sale recorded");
        Ok(sale)
    }

    #[tracing::instrument(name = "product.sled.list_sales", skip(self))]
    async fn list_sales(&self, product_id: &str) -> StorageResult<Vec<Sale>> {
        let product_id = parse_id(product_id)?;
        let products = self.store.products().clone();
        let sales = self.store.sales().clone();

        blocking(move || {
            if !product_exists(&products, &product_id)? {
                return Err(StorageError::NotFound);
            }
            scan_sales(&sales)?
                .into_iter()
                .filter(|sale| sale.product_id() == product_id)
                .map(SaleRecord::into_sale)
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 3, 24, 0, 0, 0).unwrap()
    }

    fn owner() -> Claims {
        Claims::issue("5cf37266-3473-4006-984f-9325122678b7", vec![Role::User], now())
    }

    fn comic_books() -> NewProduct {
        NewProduct {
            name: "Comic Books".to_string(),
            cost: 50,
            quantity: 42,
        }
    }

    #[tokio::test]
    async fn test_totals_fold_per_product() {
        let store = KvStore::temporary().unwrap();
        let products = SledProductStore::new(store);

        let a = products.create(&owner(), &comic_books(), now()).await.unwrap();
        let b = products.create(&owner(), &comic_books(), now()).await.unwrap();
        products.add_sale(&a.id, &NewSale { quantity: 2, paid: 100 }, now()).await.unwrap();
        products.add_sale(&a.id, &NewSale { quantity: 5, paid: 250 }, now()).await.unwrap();
        products.add_sale(&b.id, &NewSale { quantity: 3, paid: 225 }, now()).await.unwrap();

        let a = products.retrieve(&a.id).await.unwrap();
        let b = products.retrieve(&b.id).await.unwrap();
        assert_eq!((a.sold, a.revenue), (7, 350));
        assert_eq!((b.sold, b.revenue), (3, 225));
    }

    #[tokio::test]
    async fn test_delete_sweeps_sales() {
        let store = KvStore::temporary().unwrap();
        let products = SledProductStore::new(store.clone());

        let kept = products.create(&owner(), &comic_books(), now()).await.unwrap();
        let gone = products.create(&owner(), &comic_books(), now()).await.unwrap();
        products.add_sale(&kept.id, &NewSale { quantity: 1, paid: 50 }, now()).await.unwrap();
        products.add_sale(&gone.id, &NewSale { quantity: 2, paid: 100 }, now()).await.unwrap();

        products.delete(&gone.id).await.unwrap();

        assert_eq!(store.sales().len(), 1);
        assert_eq!(products.list_sales(&kept.id).await.unwrap().len(), 1);
        assert_eq!(products.list_sales(&gone.id).await, Err(StorageError::NotFound));
    }

    #[tokio::test]
    async fn test_totals_overflow_is_an_error() {
        let store = KvStore::temporary().unwrap();
        let products = SledProductStore::new(store);

        let a = products.create(&owner(), &comic_books(), now()).await.unwrap();
        let b = products.create(&owner(), &comic_books(), now()).await.unwrap();
        let huge = NewSale { quantity: i64::MAX, paid: 1 };
        products.add_sale(&a.id, &huge, now()).await.unwrap();
        products.add_sale(&a.id, &NewSale { quantity: 1, paid: 1 }, now()).await.unwrap();

        let err = products.retrieve(&a.id).await.unwrap_err();
        assert!(
            matches!(err, StorageError::Unavailable(ref msg) if msg.contains("overflow")),
            "{err}"
        );
        assert!(matches!(products.list().await, Err(StorageError::Unavailable(_))));

        // A product whose own sales fit is still readable on its own.
        assert_eq!(products.retrieve(&b.id).await.unwrap().sold, 0);
    }

    #[tokio::test]
    async fn test_sale_of_missing_product_is_not_written() {
        let store = KvStore::temporary().unwrap();
        let products = SledProductStore::new(store.clone());

        let err = products
            .add_sale(
                "a2b0639f-2cc6-44b8-b97b-15d69dbb511e",
                &NewSale { quantity: 1, paid: 1 },
                now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::NotFound);
        assert!(store.sales().is_empty());
    }
}
