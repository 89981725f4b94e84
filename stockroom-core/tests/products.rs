//! Product and sale contract, run identically against every backend.

mod common;

use chrono::Duration;
use common::{admin_claims, backends, new_product, now, precise_now, user_claims};
use stockroom_core::{NewSale, StorageError, UpdateProduct};

const OWNER_ID: &str = "45b5fbd3-755f-4379-8f07-a58d4a30fa2f";
const OTHER_ID: &str = "6d8a4c53-29e6-4b4f-9a49-d1e1e1b1f0a3";

#[tokio::test]
async fn test_create_then_retrieve() {
    for backend in backends().await {
        let storage = &backend.storage;

        let created = storage
            .create_product(&user_claims(OWNER_ID), &new_product(), precise_now())
            .await
            .unwrap();
        assert_eq!(created.user_id, OWNER_ID);
        assert_eq!((created.sold, created.revenue), (0, 0));

        let fetched = storage.retrieve_product(&created.id).await.unwrap();
        assert_eq!(fetched, created, "{}", backend.kind);
        assert_eq!(fetched.date_updated, precise_now());

        let listed = storage.list_products().await.unwrap();
        assert_eq!(listed, vec![created]);
    }
}

#[tokio::test]
async fn test_aggregates() {
    for backend in backends().await {
        let storage = &backend.storage;

        let product = storage
            .create_product(&user_claims(OWNER_ID), &new_product(), now())
            .await
            .unwrap();
        let fetched = storage.retrieve_product(&product.id).await.unwrap();
        assert_eq!((fetched.sold, fetched.revenue), (0, 0), "{}", backend.kind);

        storage
            .add_sale(&product.id, &NewSale { quantity: 2, paid: 100 }, now())
            .await
            .unwrap();
        storage
            .add_sale(&product.id, &NewSale { quantity: 5, paid: 250 }, now())
            .await
            .unwrap();

        let fetched = storage.retrieve_product(&product.id).await.unwrap();
        assert_eq!((fetched.sold, fetched.revenue), (7, 350), "{}", backend.kind);

        let listed = storage.list_products().await.unwrap();
        assert_eq!((listed[0].sold, listed[0].revenue), (7, 350), "{}", backend.kind);
    }
}

#[tokio::test]
async fn test_aggregate_overflow_is_unavailable() {
    for backend in backends().await {
        let storage = &backend.storage;
        let claims = user_claims(OWNER_ID);

        let big = storage.create_product(&claims, &new_product(), now()).await.unwrap();
        let small = storage.create_product(&claims, &new_product(), now()).await.unwrap();
        storage
            .add_sale(&big.id, &NewSale { quantity: i64::MAX, paid: 1 }, now())
            .await
            .unwrap();
        storage
            .add_sale(&big.id, &NewSale { quantity: 1, paid: 1 }, now())
            .await
            .unwrap();
        storage
            .add_sale(&small.id, &NewSale { quantity: 2, paid: 20 }, now())
            .await
            .unwrap();

        let err = storage.retrieve_product(&big.id).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)), "{}: {err}", backend.kind);
        assert!(
            matches!(storage.list_products().await, Err(StorageError::Unavailable(_))),
            "{}",
            backend.kind
        );

        let small = storage.retrieve_product(&small.id).await.unwrap();
        assert_eq!((small.sold, small.revenue), (2, 20), "{}", backend.kind);
    }
}

#[tokio::test]
async fn test_sales_of_one_product_only() {
    for backend in backends().await {
        let storage = &backend.storage;
        let claims = user_claims(OWNER_ID);

        let a = storage.create_product(&claims, &new_product(), now()).await.unwrap();
        let b = storage.create_product(&claims, &new_product(), now()).await.unwrap();
        let sale = storage
            .add_sale(&a.id, &NewSale { quantity: 3, paid: 30 }, now())
            .await
            .unwrap();
        assert_eq!(sale.product_id, a.id);

        assert_eq!(storage.list_sales(&a.id).await.unwrap(), vec![sale]);
        assert!(storage.list_sales(&b.id).await.unwrap().is_empty());
        assert_eq!(storage.retrieve_product(&b.id).await.unwrap().sold, 0);
    }
}

#[tokio::test]
async fn test_sale_errors() {
    for backend in backends().await {
        let storage = &backend.storage;
        let sale = NewSale { quantity: 1, paid: 10 };

        assert_eq!(
            storage.add_sale("bad", &sale, now()).await,
            Err(StorageError::InvalidId)
        );
        assert_eq!(
            storage.add_sale(OTHER_ID, &sale, now()).await,
            Err(StorageError::NotFound),
            "{}",
            backend.kind
        );
        assert_eq!(storage.list_sales(OTHER_ID).await, Err(StorageError::NotFound));

        let err = storage
            .add_sale(OTHER_ID, &NewSale { quantity: -1, paid: 10 }, now())
            .await
            .unwrap_err();
        assert!(err.is_validation_on("quantity"));
    }
}

#[tokio::test]
async fn test_invalid_payloads() {
    for backend in backends().await {
        let storage = &backend.storage;

        let mut payload = new_product();
        payload.cost = -1;
        payload.quantity = 0;
        let err = storage
            .create_product(&user_claims(OWNER_ID), &payload, now())
            .await
            .unwrap_err();
        assert!(err.is_validation_on("cost"));
        assert!(err.is_validation_on("quantity"));
        assert!(storage.list_products().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_retrieve_errors() {
    for backend in backends().await {
        let storage = &backend.storage;

        assert_eq!(
            storage.retrieve_product("not-a-uuid").await,
            Err(StorageError::InvalidId)
        );
        assert_eq!(
            storage.retrieve_product(OTHER_ID).await,
            Err(StorageError::NotFound),
            "{}",
            backend.kind
        );
    }
}

#[tokio::test]
async fn test_update_partial() {
    for backend in backends().await {
        let storage = &backend.storage;

        let before = storage
            .create_product(&user_claims(OWNER_ID), &new_product(), now())
            .await
            .unwrap();
        let later = now() + Duration::minutes(1);

        let patch = UpdateProduct {
            name: Some("Graphic Novels".to_string()),
            ..Default::default()
        };
        storage
            .update_product(&user_claims(OWNER_ID), &before.id, &patch, later)
            .await
            .unwrap();

        let after = storage.retrieve_product(&before.id).await.unwrap();
        assert_eq!(after.name, "Graphic Novels");
        assert_eq!(after.cost, before.cost, "{}", backend.kind);
        assert_eq!(after.quantity, before.quantity);
        assert_eq!(after.user_id, before.user_id);
        assert_eq!(after.date_created, before.date_created);
        assert_eq!(after.date_updated, later);
    }
}

#[tokio::test]
async fn test_update_authorization() {
    for backend in backends().await {
        let storage = &backend.storage;

        let product = storage
            .create_product(&user_claims(OWNER_ID), &new_product(), now())
            .await
            .unwrap();
        let patch = UpdateProduct {
            cost: Some(99),
            ..Default::default()
        };

        assert_eq!(
            storage
                .update_product(&user_claims(OTHER_ID), &product.id, &patch, now())
                .await,
            Err(StorageError::Forbidden),
            "{}",
            backend.kind
        );
        assert_eq!(
            storage
                .update_product(&admin_claims(), OTHER_ID, &patch, now())
                .await,
            Err(StorageError::NotFound)
        );

        storage
            .update_product(&admin_claims(), &product.id, &patch, now())
            .await
            .unwrap();
        assert_eq!(storage.retrieve_product(&product.id).await.unwrap().cost, 99);
    }
}

#[tokio::test]
async fn test_delete_cascades_and_is_idempotent() {
    for backend in backends().await {
        let storage = &backend.storage;
        let claims = user_claims(OWNER_ID);

        let kept = storage.create_product(&claims, &new_product(), now()).await.unwrap();
        let gone = storage.create_product(&claims, &new_product(), now()).await.unwrap();
        storage
            .add_sale(&kept.id, &NewSale { quantity: 1, paid: 10 }, now())
            .await
            .unwrap();
        storage
            .add_sale(&gone.id, &NewSale { quantity: 4, paid: 40 }, now())
            .await
            .unwrap();

        storage.delete_product(&gone.id).await.unwrap();
        storage.delete_product(&gone.id).await.unwrap();
        storage.delete_product(OTHER_ID).await.unwrap();
        assert_eq!(
            storage.delete_product("bad").await,
            Err(StorageError::InvalidId)
        );

        assert_eq!(
            storage.retrieve_product(&gone.id).await,
            Err(StorageError::NotFound),
            "{}",
            backend.kind
        );
        assert_eq!(storage.list_sales(&kept.id).await.unwrap().len(), 1);

        let listed = storage.list_products().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!((listed[0].sold, listed[0].revenue), (1, 10));
    }
}
