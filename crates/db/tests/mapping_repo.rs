//! Integration tests for the mapping repository and its store adapter.

use std::sync::Arc;

use shopmig_core::mapping::{MappingService, NewMapping};
use shopmig_core::types::ConnectionId;
use shopmig_db::models::connection::CreateConnection;
use shopmig_db::repositories::{ConnectionRepo, MappingRepo};
use shopmig_db::store::{PgMappingStore, PgReferenceData};
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn connection(pool: &PgPool) -> ConnectionId {
    ConnectionRepo::create(
        pool,
        &CreateConnection {
            name: "legacy".to_string(),
            profile_name: "shopware55".to_string(),
            gateway_name: "local".to_string(),
        },
    )
    .await
    .unwrap()
    .id
}

fn service(pool: &PgPool) -> MappingService {
    MappingService::new(
        Arc::new(PgMappingStore::new(pool.clone())),
        Arc::new(PgReferenceData::new(pool.clone())),
    )
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_batch_insert_spans_several_statements(pool: PgPool) {
    let conn = connection(&pool).await;
    let rows: Vec<NewMapping> = (0..2500)
        .map(|i| NewMapping::identity(conn, "product", &i.to_string(), Uuid::new_v4()))
        .collect();

    let inserted = MappingRepo::batch_insert(&pool, &rows).await.unwrap();

    assert_eq!(inserted, 2500);
    let stored = MappingRepo::find_by_entity(&pool, conn, "product").await.unwrap();
    assert_eq!(stored.len(), 2500);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_valued_mappings(pool: PgPool) {
    let conn = connection(&pool).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let rows = vec![
        NewMapping::identity(conn, "product_category", "7", first),
        NewMapping::identity(conn, "product_category", "7", second),
    ];
    MappingRepo::batch_insert(&pool, &rows).await.unwrap();

    let all = MappingRepo::find_all(&pool, conn, "product_category", "7").await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(MappingRepo::exists(&pool, conn, "product_category", "7", second)
        .await
        .unwrap());
    assert!(!MappingRepo::exists(&pool, conn, "product_category", "8", second)
        .await
        .unwrap());

    let id = MappingRepo::find_id_by_entity_uuid(&pool, conn, first)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(MappingRepo::delete_by_ids(&pool, &[id]).await.unwrap(), 1);
    let left = MappingRepo::find_all(&pool, conn, "product_category", "7").await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].entity_uuid, Some(second));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_value_mapping_round_trip(pool: PgPool) {
    let conn = connection(&pool).await;
    let mut row = NewMapping::value(conn, "order_state", "0", "open");
    row.additional_data = Some(serde_json::json!({"source": "status"}));
    MappingRepo::batch_insert(&pool, &[row]).await.unwrap();

    let found = MappingRepo::find_first(&pool, conn, "order_state", "0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.entity_uuid, None);
    assert_eq!(found.entity_value.as_deref(), Some("open"));
    assert_eq!(found.additional_data.unwrap()["source"], "status");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_mappings_are_deleted_with_connection(pool: PgPool) {
    let conn = connection(&pool).await;
    MappingRepo::batch_insert(&pool, &[NewMapping::identity(conn, "category", "1", Uuid::new_v4())])
        .await
        .unwrap();

    assert!(ConnectionRepo::delete(&pool, conn).await.unwrap());
    assert!(MappingRepo::find_first(&pool, conn, "category", "1")
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Mapping service over Postgres
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_created_uuid_survives_flush(pool: PgPool) {
    let conn = connection(&pool).await;

    let mut first_run = service(&pool);
    let uuid = first_run.create_uuid(conn, "category", "3").await.unwrap();
    assert_eq!(first_run.flush().await.unwrap(), 1);

    let mut second_run = service(&pool);
    assert_eq!(
        second_run.resolve_uuid(conn, "category", "3").await.unwrap(),
        Some(uuid)
    );
    assert_eq!(second_run.create_uuid(conn, "category", "3").await.unwrap(), uuid);
    assert_eq!(second_run.pending_len(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_flush_without_connection_is_store_error(pool: PgPool) {
    let mut service = service(&pool);
    service
        .create_uuid(Uuid::new_v4(), "category", "3")
        .await
        .unwrap();

    let err = service.flush().await.unwrap_err();
    assert_eq!(err.code(), "SWAG_MIGRATION__STORE_ERROR");
    assert_eq!(service.pending_len(), 1);
}
