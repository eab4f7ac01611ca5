//! Repository for the `migration_logs` table.

use shopmig_core::logging::{LogEntry, LogLevel};
use shopmig_core::types::RunId;
use sqlx::PgPool;

use super::{rows_per_insert, values_placeholders};
use crate::models::log::LogRow;

const COLUMNS: &str = "\
    id, run_id, level, log_type, title, description, details, count, created_at";

/// Column list for INSERT (excludes the generated `id`).
const INSERT_COLUMNS: &str = "\
    run_id, level, log_type, title, description, details, count, created_at";

const INSERT_COLUMN_COUNT: usize = 8;

/// Append-only access to the per-run migration log.
pub struct LogRepo;

impl LogRepo {
    /// Insert every entry, chunked into multi-row INSERTs.
    pub async fn batch_insert(pool: &PgPool, entries: &[LogEntry]) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;

        for chunk in entries.chunks(rows_per_insert(INSERT_COLUMN_COUNT)) {
            let query = format!(
                "INSERT INTO migration_logs ({INSERT_COLUMNS}) VALUES {}",
                values_placeholders(chunk.len(), INSERT_COLUMN_COUNT)
            );

            let mut q = sqlx::query(&query);
            for entry in chunk {
                q = q
                    .bind(entry.run_id)
                    .bind(entry.level.as_str())
                    .bind(&entry.log_type)
                    .bind(&entry.title)
                    .bind(&entry.description)
                    .bind(&entry.details)
                    .bind(entry.count as i32)
                    .bind(entry.created_at);
            }
            inserted += q.execute(pool).await?.rows_affected();
        }

        Ok(inserted)
    }

    /// Entries of a run in insertion order.
    pub async fn list_by_run(pool: &PgPool, run_id: RunId) -> Result<Vec<LogRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM migration_logs WHERE run_id = $1 ORDER BY id");
        sqlx::query_as::<_, LogRow>(&query)
            .bind(run_id)
            .fetch_all(pool)
            .await
    }

    pub async fn count_by_level(
        pool: &PgPool,
        run_id: RunId,
        level: LogLevel,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)::BIGINT FROM migration_logs WHERE run_id = $1 AND level = $2",
        )
        .bind(run_id)
        .bind(level.as_str())
        .fetch_one(pool)
        .await
    }
}
