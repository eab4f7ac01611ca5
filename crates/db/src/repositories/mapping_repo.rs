//! Repository for the `migration_mappings` table.
//!
//! Lookups filter on `(connection_id, entity, old_identifier)`, which is
//! indexed but not unique.

use shopmig_core::mapping::NewMapping;
use shopmig_core::types::ConnectionId;
use sqlx::PgPool;
use uuid::Uuid;

use super::{rows_per_insert, values_placeholders};
use crate::models::mapping::MappingRecord;

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const COLUMNS: &str = "\
    id, connection_id, entity, old_identifier, entity_uuid, \
    entity_value, additional_data, created_at";

/// Column list for INSERT (excludes `created_at`).
const INSERT_COLUMNS: &str = "\
    id, connection_id, entity, old_identifier, entity_uuid, \
    entity_value, additional_data";

const INSERT_COLUMN_COUNT: usize = 7;

// ---------------------------------------------------------------------------
// MappingRepo
// ---------------------------------------------------------------------------

pub struct MappingRepo;

impl MappingRepo {
    /// Insert every row in one transaction, chunked into multi-row INSERTs.
    ///
    /// Returns the number of inserted rows.
    pub async fn batch_insert(pool: &PgPool, rows: &[NewMapping]) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        let mut inserted = 0;

        for chunk in rows.chunks(rows_per_insert(INSERT_COLUMN_COUNT)) {
            let query = format!(
                "INSERT INTO migration_mappings ({INSERT_COLUMNS}) VALUES {}",
                values_placeholders(chunk.len(), INSERT_COLUMN_COUNT)
            );

            let mut q = sqlx::query(&query);
            for row in chunk {
                q = q
                    .bind(Uuid::now_v7())
                    .bind(row.connection_id)
                    .bind(&row.entity)
                    .bind(&row.old_identifier)
                    .bind(row.entity_uuid)
                    .bind(&row.entity_value)
                    .bind(&row.additional_data);
            }
            inserted += q.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn find_first(
        pool: &PgPool,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
    ) -> Result<Option<MappingRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM migration_mappings
             WHERE connection_id = $1 AND entity = $2 AND old_identifier = $3
             LIMIT 1"
        );
        sqlx::query_as::<_, MappingRecord>(&query)
            .bind(connection_id)
            .bind(entity)
            .bind(old_identifier)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_all(
        pool: &PgPool,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
    ) -> Result<Vec<MappingRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM migration_mappings
             WHERE connection_id = $1 AND entity = $2 AND old_identifier = $3
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, MappingRecord>(&query)
            .bind(connection_id)
            .bind(entity)
            .bind(old_identifier)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_entity(
        pool: &PgPool,
        connection_id: ConnectionId,
        entity: &str,
    ) -> Result<Vec<MappingRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM migration_mappings
             WHERE connection_id = $1 AND entity = $2
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, MappingRecord>(&query)
            .bind(connection_id)
            .bind(entity)
            .fetch_all(pool)
            .await
    }

    pub async fn exists(
        pool: &PgPool,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
        entity_uuid: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM migration_mappings
                WHERE connection_id = $1 AND entity = $2
                  AND old_identifier = $3 AND entity_uuid = $4
             )",
        )
        .bind(connection_id)
        .bind(entity)
        .bind(old_identifier)
        .bind(entity_uuid)
        .fetch_one(pool)
        .await
    }

    pub async fn find_id_by_entity_uuid(
        pool: &PgPool,
        connection_id: ConnectionId,
        entity_uuid: Uuid,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM migration_mappings
             WHERE connection_id = $1 AND entity_uuid = $2
             LIMIT 1",
        )
        .bind(connection_id)
        .bind(entity_uuid)
        .fetch_optional(pool)
        .await
    }

    /// Returns the number of deleted rows.
    pub async fn delete_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM migration_mappings WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
