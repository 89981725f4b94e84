//! Shared fixtures: one migrated store per backend in a fresh temp directory.

#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use stockroom_core::{
    schema, BackendKind, Claims, DatabaseHandle, NewProduct, NewUser, Role, Storage, StoreConfig,
};
use tempfile::TempDir;

/// A migrated backend and the directory that holds it.
pub struct Backend {
    pub kind: BackendKind,
    pub handle: DatabaseHandle,
    pub storage: Storage,
    _dir: TempDir,
}

/// Both backends, migrated and empty.
pub async fn backends() -> Vec<Backend> {
    init_tracing();

    let mut out = Vec::new();
    for kind in [BackendKind::Sqlite, BackendKind::Sled] {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StoreConfig::default()
            .with_backend(kind)
            .with_sql_path(dir.path().join("stockroom.sqlite"))
            .with_kv_path(dir.path().join("kv"))
            .with_open_timeout(Duration::from_secs(5));

        let handle = DatabaseHandle::open(&config).await.expect("open backend");
        schema::migrate(&handle).await.expect("migrate");
        let storage = handle.storage();

        out.push(Backend {
            kind,
            handle,
            storage,
            _dir: dir,
        });
    }
    out
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 3, 24, 0, 0, 0).unwrap()
}

/// Same day as `now`, with a sub-second part that must survive storage.
pub fn precise_now() -> DateTime<Utc> {
    Utc.timestamp_opt(now().timestamp(), 123_456_789).unwrap()
}

pub fn admin_claims() -> Claims {
    Claims::issue(
        "00000000-0000-0000-0000-000000000001",
        vec![Role::Admin, Role::User],
        now(),
    )
}

pub fn user_claims(id: &str) -> Claims {
    Claims::issue(id, vec![Role::User], now())
}

pub fn new_user(email: &str) -> NewUser {
    NewUser {
        name: "Bill Kennedy".to_string(),
        email: email.to_string(),
        roles: vec![Role::User],
        password: "gophers".to_string(),
        password_confirm: "gophers".to_string(),
    }
}

pub fn new_product() -> NewProduct {
    NewProduct {
        name: "Comic Books".to_string(),
        cost: 10,
        quantity: 55,
    }
}
