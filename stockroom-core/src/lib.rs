//! Stockroom Core - Dual-Backend Persistence
//!
//! TigerStyle storage contract for users, products and sales, with two
//! interchangeable backends that must be observably identical.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Storage (UserStorage + ProductStorage)        │
//! │        validation · authorization policy · error taxonomy    │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                              ↑
//!          │                              │
//! ┌────────┴────────┐           ┌────────┴────────┐
//! │   SQL backend   │           │   KV backend    │
//! │ (sqlx + SQLite) │           │     (sled)      │
//! │ joins, UNIQUE,  │           │ prefix-tagged   │
//! │ ON DELETE       │           │ index, manual   │
//! │ CASCADE         │           │ uniqueness, tx  │
//! └─────────────────┘           └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use stockroom_core::{schema, DatabaseHandle, StoreConfig};
//!
//! let config = StoreConfig::from_env()?;
//! let handle = DatabaseHandle::open(&config).await?;
//! schema::migrate(&handle).await?;
//!
//! let storage = handle.storage();
//! let users = storage.list_users().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod constants;
pub mod database;
pub mod model;
pub mod schema;
pub mod storage;

// Re-export common types
pub use auth::{Claims, Role};
pub use config::{BackendKind, ConfigError, StoreConfig};
pub use constants::*;
pub use database::DatabaseHandle;
pub use model::{
    FieldError, NewProduct, NewSale, NewUser, Product, Sale, UpdateProduct, UpdateUser, User,
    Validate, ValidationErrors,
};
pub use schema::SchemaError;
pub use storage::{
    KvStore, ProductStorage, SledProductStore, SledUserStore, SqliteProductStore,
    SqliteUserStore, StatusChecker, Storage, StorageError, StorageResult, UserStorage,
};
