//! Record codec - versioned bincode encoding of KV values.
//!
//! TigerStyle: one leading version byte, then the bincode body. A value with
//! an unknown version or a body that does not parse is `Unavailable`, never
//! silently skipped.
//!
//! Timestamps are stored as (seconds, nanoseconds) since the Unix epoch in
//! UTC so that sub-second precision survives a round trip.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::constants::KV_RECORD_FORMAT_VERSION;
use crate::model::{HashedPassword, Product, Sale, User};
use crate::storage::error::{StorageError, StorageResult};

// =============================================================================
// Framing
// =============================================================================

/// Encode a record with the current format version.
///
/// # Errors
/// `StorageError::Unavailable` if bincode fails.
pub fn encode<T: Serialize>(record: &T) -> StorageResult<Vec<u8>> {
    let body = bincode::serialize(record)
        .map_err(|e| StorageError::unavailable(format!("encoding record: {e}")))?;

    let mut bytes = Vec::with_capacity(1 + body.len());
    bytes.push(KV_RECORD_FORMAT_VERSION);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decode a record written by [`encode`].
///
/// # Errors
/// `StorageError::Unavailable` on an empty value, a foreign version byte or a
/// malformed body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    let Some((&version, body)) = bytes.split_first() else {
        return Err(StorageError::unavailable("decoding record: empty value"));
    };
    if version != KV_RECORD_FORMAT_VERSION {
        return Err(StorageError::unavailable(format!(
            "decoding record: format version {version}, expected {KV_RECORD_FORMAT_VERSION}"
        )));
    }

    bincode::deserialize(body)
        .map_err(|e| StorageError::unavailable(format!("decoding record: {e}")))
}

// =============================================================================
// Timestamp
// =============================================================================

/// UTC instant with nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self {
            secs: at.timestamp(),
            nanos: at.timestamp_subsec_nanos(),
        }
    }
}

impl Timestamp {
    fn to_datetime(self) -> StorageResult<DateTime<Utc>> {
        Utc.timestamp_opt(self.secs, self.nanos).single().ok_or_else(|| {
            StorageError::unavailable(format!(
                "decoding record: timestamp {}.{:09} out of range",
                self.secs, self.nanos
            ))
        })
    }
}

// =============================================================================
// Records
// =============================================================================

/// Stored shape of a user, including the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    id: String,
    name: String,
    email: String,
    roles: Vec<Role>,
    password_hash: String,
    date_created: Timestamp,
    date_updated: Timestamp,
}

impl From<&User> for UserRecord {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            roles: user.roles.clone(),
            password_hash: user.password_hash.as_str().to_owned(),
            date_created: user.date_created.into(),
            date_updated: user.date_updated.into(),
        }
    }
}

impl UserRecord {
    /// Rebuild the user.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if a timestamp is out of range.
    pub fn into_user(self) -> StorageResult<User> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            roles: self.roles,
            password_hash: HashedPassword::new(self.password_hash),
            date_created: self.date_created.to_datetime()?,
            date_updated: self.date_updated.to_datetime()?,
        })
    }
}

/// Stored shape of a product. Aggregates are not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    id: String,
    name: String,
    cost: i64,
    quantity: i64,
    user_id: String,
    date_created: Timestamp,
    date_updated: Timestamp,
}

impl From<&Product> for ProductRecord {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            cost: product.cost,
            quantity: product.quantity,
            user_id: product.user_id.clone(),
            date_created: product.date_created.into(),
            date_updated: product.date_updated.into(),
        }
    }
}

impl ProductRecord {
    /// Rebuild the product with zero aggregates.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if a timestamp is out of range.
    pub fn into_product(self) -> StorageResult<Product> {
        Ok(Product {
            id: self.id,
            name: self.name,
            cost: self.cost,
            quantity: self.quantity,
            sold: 0,
            revenue: 0,
            user_id: self.user_id,
            date_created: self.date_created.to_datetime()?,
            date_updated: self.date_updated.to_datetime()?,
        })
    }
}

/// Stored shape of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    id: String,
    product_id: String,
    quantity: i64,
    paid: i64,
    date_created: Timestamp,
}

impl From<&Sale> for SaleRecord {
    fn from(sale: &Sale) -> Self {
        Self {
            id: sale.id.clone(),
            product_id: sale.product_id.clone(),
            quantity: sale.quantity,
            paid: sale.paid,
            date_created: sale.date_created.into(),
        }
    }
}

impl SaleRecord {
    /// ID of the product this sale references.
    #[must_use]
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Units and amount, for aggregation.
    #[must_use]
    pub fn totals(&self) -> (i64, i64) {
        (self.quantity, self.paid)
    }

    /// Rebuild the sale.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if the timestamp is out of range.
    pub fn into_sale(self) -> StorageResult<Sale> {
        Ok(Sale {
            id: self.id,
            product_id: self.product_id,
            quantity: self.quantity,
            paid: self.paid,
            date_created: self.date_created.to_datetime()?,
        })
    }
}
