//! Migrate and seed, on both backends.

mod common;

use common::{admin_claims, backends, now};
use stockroom_core::schema::{
    self, SEED_ADMIN_ID, SEED_PASSWORD, SEED_PRODUCT_COMIC_BOOKS_ID, SEED_PRODUCT_TOYS_ID,
    SEED_USER_ID,
};
use stockroom_core::{DatabaseHandle, Role, StorageError, KV_RECORD_FORMAT_VERSION};

#[tokio::test]
async fn test_migrate_is_idempotent() {
    for backend in backends().await {
        // Already migrated once by the fixture.
        schema::migrate(&backend.handle).await.unwrap();
        schema::migrate(&backend.handle).await.unwrap();
        backend.storage.status_check().await.unwrap();

        match &backend.handle {
            DatabaseHandle::Sqlite(pool) => {
                let versions: Vec<i64> =
                    sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version")
                        .fetch_all(pool)
                        .await
                        .unwrap();
                assert_eq!(versions, vec![1, 2, 3, 4]);
            }
            DatabaseHandle::Sled(store) => {
                assert_eq!(
                    store.format_version().await.unwrap(),
                    Some(KV_RECORD_FORMAT_VERSION)
                );
            }
        }
    }
}

#[tokio::test]
async fn test_altered_migration_is_detected() {
    for backend in backends().await {
        let DatabaseHandle::Sqlite(pool) = &backend.handle else {
            continue;
        };
        sqlx::query("UPDATE schema_version SET checksum = 'tampered' WHERE version = 2")
            .execute(pool)
            .await
            .unwrap();

        let err = schema::migrate(&backend.handle).await.unwrap_err();
        assert!(
            matches!(err, schema::SchemaError::ChecksumMismatch { version: 2, .. }),
            "{err}"
        );
    }
}

#[tokio::test]
async fn test_seed_contents() {
    for backend in backends().await {
        let storage = &backend.storage;
        schema::seed(&backend.handle).await.unwrap();

        let users = storage.list_users().await.unwrap();
        assert_eq!(users.len(), 2, "{}", backend.kind);

        let admin = storage
            .retrieve_user(&admin_claims(), SEED_ADMIN_ID)
            .await
            .unwrap();
        assert_eq!(admin.email, "admin@example.com");
        assert_eq!(admin.roles, vec![Role::Admin, Role::User]);
        assert_eq!(admin.date_created.to_rfc3339(), "2019-03-24T00:00:00+00:00");

        let claims = storage
            .authenticate(now(), "user@example.com", SEED_PASSWORD)
            .await
            .unwrap();
        assert_eq!(claims.subject, SEED_USER_ID);

        let comics = storage
            .retrieve_product(SEED_PRODUCT_COMIC_BOOKS_ID)
            .await
            .unwrap();
        assert_eq!((comics.cost, comics.quantity), (50, 42));
        assert_eq!((comics.sold, comics.revenue), (7, 350), "{}", backend.kind);
        assert_eq!(comics.user_id, SEED_ADMIN_ID);

        let toys = storage.retrieve_product(SEED_PRODUCT_TOYS_ID).await.unwrap();
        assert_eq!((toys.sold, toys.revenue), (3, 225), "{}", backend.kind);
    }
}

#[tokio::test]
async fn test_seed_is_idempotent() {
    for backend in backends().await {
        let storage = &backend.storage;
        schema::seed(&backend.handle).await.unwrap();
        let first = storage.retrieve_user(&admin_claims(), SEED_ADMIN_ID).await.unwrap();

        schema::seed(&backend.handle).await.unwrap();

        assert_eq!(storage.list_users().await.unwrap().len(), 2);
        assert_eq!(storage.list_products().await.unwrap().len(), 2);
        assert_eq!(
            storage.list_sales(SEED_PRODUCT_COMIC_BOOKS_ID).await.unwrap().len(),
            2,
            "{}",
            backend.kind
        );

        // The second run did not overwrite the stored hash.
        let second = storage.retrieve_user(&admin_claims(), SEED_ADMIN_ID).await.unwrap();
        assert_eq!(first.password_hash, second.password_hash, "{}", backend.kind);
    }
}

#[tokio::test]
async fn test_seeded_product_delete_cascades() {
    for backend in backends().await {
        let storage = &backend.storage;
        schema::seed(&backend.handle).await.unwrap();

        storage.delete_product(SEED_PRODUCT_TOYS_ID).await.unwrap();
        assert_eq!(
            storage.retrieve_product(SEED_PRODUCT_TOYS_ID).await,
            Err(StorageError::NotFound)
        );
        assert_eq!(
            storage.list_products().await.unwrap().len(),
            1,
            "{}",
            backend.kind
        );
        assert_eq!(
            storage.list_sales(SEED_PRODUCT_COMIC_BOOKS_ID).await.unwrap().len(),
            2
        );
    }
}
