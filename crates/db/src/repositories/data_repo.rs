//! Repository for the `migration_data` table.

use serde_json::Value;
use shopmig_core::fetcher::ConvertedRecord;
use shopmig_core::types::RunId;
use sqlx::PgPool;
use uuid::Uuid;

use super::{rows_per_insert, values_placeholders};
use crate::models::data::DataRow;

const COLUMNS: &str = "id, run_id, entity, old_identifier, converted, unmapped, created_at";

const INSERT_COLUMNS: &str = "id, run_id, entity, old_identifier, converted, unmapped";

const INSERT_COLUMN_COUNT: usize = 6;

/// Converted data envelopes, one row per converted record.
pub struct DataRepo;

impl DataRepo {
    pub async fn batch_insert(
        pool: &PgPool,
        records: &[ConvertedRecord],
    ) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;

        for chunk in records.chunks(rows_per_insert(INSERT_COLUMN_COUNT)) {
            let query = format!(
                "INSERT INTO migration_data ({INSERT_COLUMNS}) VALUES {}",
                values_placeholders(chunk.len(), INSERT_COLUMN_COUNT)
            );

            let mut q = sqlx::query(&query);
            for record in chunk {
                q = q
                    .bind(Uuid::now_v7())
                    .bind(record.run_id)
                    .bind(&record.entity)
                    .bind(&record.old_id)
                    .bind(record.converted.clone().map(Value::Object))
                    .bind(record.unmapped.clone().map(Value::Object));
            }
            inserted += q.execute(pool).await?.rows_affected();
        }

        Ok(inserted)
    }

    pub async fn list_by_run_and_entity(
        pool: &PgPool,
        run_id: RunId,
        entity: &str,
    ) -> Result<Vec<DataRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM migration_data
             WHERE run_id = $1 AND entity = $2
             ORDER BY id"
        );
        sqlx::query_as::<_, DataRow>(&query)
            .bind(run_id)
            .bind(entity)
            .fetch_all(pool)
            .await
    }

    /// Rows of a run that carry a converted record.
    pub async fn count_converted(pool: &PgPool, run_id: RunId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)::BIGINT FROM migration_data
             WHERE run_id = $1 AND converted IS NOT NULL",
        )
        .bind(run_id)
        .fetch_one(pool)
        .await
    }
}
