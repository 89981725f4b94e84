//! Product and Sale - Inventory records and their payloads.
//!
//! `sold` and `revenue` are derived on every read by folding over the sales
//! that reference a product. They are never persisted on the product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{check_max_bytes, check_min, check_required, Validate, ValidationErrors};
use crate::constants::{PRODUCT_NAME_BYTES_MAX, PRODUCT_QUANTITY_MIN};

// =============================================================================
// Product
// =============================================================================

/// An item for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier (UUID, lowercase hyphenated)
    pub id: String,
    /// Display name
    pub name: String,
    /// Price of one unit in minor currency units
    pub cost: i64,
    /// Units originally available
    pub quantity: i64,
    /// Aggregate: units sold across all sales
    pub sold: i64,
    /// Aggregate: total paid across all sales
    pub revenue: i64,
    /// ID of the user who created the product
    pub user_id: String,
    /// Creation timestamp
    pub date_created: DateTime<Utc>,
    /// Last update timestamp
    pub date_updated: DateTime<Utc>,
}

impl Product {
    /// Build a fresh record, with zero aggregates, from a validated payload.
    #[must_use]
    pub fn from_new(id: String, new: &NewProduct, owner_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name.clone(),
            cost: new.cost,
            quantity: new.quantity,
            sold: 0,
            revenue: 0,
            user_id: owner_id,
            date_created: now,
            date_updated: now,
        }
    }

    /// Fold one sale into the aggregates.
    pub fn add_sale(&mut self, quantity: i64, paid: i64) {
        self.sold += quantity;
        self.revenue += paid;
    }

    /// Apply a validated patch.
    pub fn apply(&mut self, patch: &UpdateProduct, now: DateTime<Utc>) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(cost) = patch.cost {
            self.cost = cost;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        self.date_updated = now;
    }
}

/// What callers supply to add a product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    /// Display name
    pub name: String,
    /// Price of one unit, non-negative
    pub cost: i64,
    /// Units available, at least one
    pub quantity: i64,
}

impl Validate for NewProduct {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        check_required(&mut errors, "name", &self.name);
        check_max_bytes(&mut errors, "name", &self.name, PRODUCT_NAME_BYTES_MAX);
        check_min(&mut errors, "cost", self.cost, 0);
        check_min(&mut errors, "quantity", self.quantity, PRODUCT_QUANTITY_MIN);

        errors.into_result()
    }
}

/// Partial update: `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProduct {
    /// New display name
    pub name: Option<String>,
    /// New unit cost
    pub cost: Option<i64>,
    /// New initial quantity
    pub quantity: Option<i64>,
}

impl Validate for UpdateProduct {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(name) = &self.name {
            check_required(&mut errors, "name", name);
            check_max_bytes(&mut errors, "name", name, PRODUCT_NAME_BYTES_MAX);
        }
        if let Some(cost) = self.cost {
            check_min(&mut errors, "cost", cost, 0);
        }
        if let Some(quantity) = self.quantity {
            check_min(&mut errors, "quantity", quantity, PRODUCT_QUANTITY_MIN);
        }

        errors.into_result()
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Some amount of one product sold in one transaction.
///
/// `paid` may differ from `quantity * cost` due to negotiated pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Unique identifier (UUID, lowercase hyphenated)
    pub id: String,
    /// The product sold
    pub product_id: String,
    /// Units sold
    pub quantity: i64,
    /// Total paid
    pub paid: i64,
    /// When the sale was recorded
    pub date_created: DateTime<Utc>,
}

impl Sale {
    /// Build a fresh record from a validated payload.
    #[must_use]
    pub fn from_new(id: String, product_id: String, new: &NewSale, now: DateTime<Utc>) -> Self {
        Self {
            id,
            product_id,
            quantity: new.quantity,
            paid: new.paid,
            date_created: now,
        }
    }
}

/// What callers supply to record a sale.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSale {
    /// Units sold, non-negative
    pub quantity: i64,
    /// Total paid, non-negative
    pub paid: i64,
}

impl Validate for NewSale {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        check_min(&mut errors, "quantity", self.quantity, 0);
        check_min(&mut errors, "paid", self.paid, 0);

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_product_rejects_negatives() {
        let payload = NewProduct {
            name: String::new(),
            cost: -1,
            quantity: 0,
        };
        let errors = payload.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.has_field("name"));
        assert!(errors.has_field("cost"));
        assert!(errors.has_field("quantity"));

        let payload = NewProduct {
            name: "Comic Books".to_string(),
            cost: 0,
            quantity: 1,
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_update_product_partial() {
        assert!(UpdateProduct::default().validate().is_ok());

        let patch = UpdateProduct {
            cost: Some(-5),
            ..Default::default()
        };
        let errors = patch.validate().unwrap_err();
        assert_eq!(errors.errors()[0].field, "cost");
    }

    #[test]
    fn test_new_sale_bounds() {
        assert!(NewSale { quantity: 0, paid: 0 }.validate().is_ok());
        let errors = NewSale { quantity: -1, paid: -1 }.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_aggregates_fold() {
        let now = Utc.with_ymd_and_hms(2019, 3, 24, 0, 0, 0).unwrap();
        let new = NewProduct {
            name: "Comic Books".to_string(),
            cost: 50,
            quantity: 42,
        };
        let mut product = Product::from_new("id".to_string(), &new, "owner".to_string(), now);
        assert_eq!((product.sold, product.revenue), (0, 0));

        product.add_sale(2, 100);
        product.add_sale(5, 250);
        assert_eq!((product.sold, product.revenue), (7, 350));
    }
}
