//! Model - Canonical record shapes and pure validation.
//!
//! Shared by every backend so that a payload accepted by one is accepted by
//! the other, and rejected payloads never reach either.

mod product;
mod user;
mod validation;

pub use product::{NewProduct, NewSale, Product, Sale, UpdateProduct};
pub use user::{normalize_email, HashedPassword, NewUser, UpdateUser, User};
pub use validation::{FieldError, Validate, ValidationErrors};
