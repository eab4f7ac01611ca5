//! Repository for the `migration_media_files` table (the media download
//! queue).

use shopmig_core::media::MediaFileRequest;
use sqlx::PgPool;
use uuid::Uuid;

use super::{rows_per_insert, values_placeholders};
use crate::models::media_file::MediaFileRow;

const COLUMNS: &str = "\
    id, run_id, uri, file_name, file_size, media_id, \
    processed, process_failure, created_at, updated_at";

const INSERT_COLUMNS: &str = "id, run_id, uri, file_name, file_size, media_id";

const INSERT_COLUMN_COUNT: usize = 6;

pub struct MediaFileRepo;

impl MediaFileRepo {
    pub async fn batch_insert(
        pool: &PgPool,
        files: &[MediaFileRequest],
    ) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;

        for chunk in files.chunks(rows_per_insert(INSERT_COLUMN_COUNT)) {
            let query = format!(
                "INSERT INTO migration_media_files ({INSERT_COLUMNS}) VALUES {}",
                values_placeholders(chunk.len(), INSERT_COLUMN_COUNT)
            );

            let mut q = sqlx::query(&query);
            for file in chunk {
                q = q
                    .bind(Uuid::now_v7())
                    .bind(file.run_id)
                    .bind(&file.uri)
                    .bind(&file.file_name)
                    .bind(i64::try_from(file.file_size).unwrap_or(i64::MAX))
                    .bind(file.media_id);
            }
            inserted += q.execute(pool).await?.rows_affected();
        }

        Ok(inserted)
    }

    /// Files neither processed nor given up, grouped by run and oldest first.
    pub async fn list_unprocessed(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<MediaFileRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM migration_media_files
             WHERE NOT processed AND NOT process_failure
             ORDER BY run_id, created_at, id
             LIMIT $1"
        );
        sqlx::query_as::<_, MediaFileRow>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<MediaFileRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM migration_media_files WHERE id = ANY($1)");
        sqlx::query_as::<_, MediaFileRow>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    pub async fn mark_processed(pool: &PgPool, ids: &[Uuid]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE migration_media_files
             SET processed = true, process_failure = false, updated_at = now()
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Give up on files; they are no longer listed as unprocessed.
    pub async fn mark_failed(pool: &PgPool, ids: &[Uuid]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE migration_media_files
             SET process_failure = true, updated_at = now()
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
