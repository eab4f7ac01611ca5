//! Repository for the `migration_runs` table.

use shopmig_core::run::{MigrationRun, RunStatus};
use shopmig_core::types::{ConnectionId, RunId};
use sqlx::PgPool;

use crate::models::run::RunRow;

const COLUMNS: &str = "\
    id, connection_id, status, language_id, currency_id, \
    currency_precision, sales_channel_id, created_at, updated_at";

/// Provides CRUD operations for migration runs.
pub struct RunRepo;

impl RunRepo {
    /// Insert a run as built by [`MigrationRun::new`].
    pub async fn create(pool: &PgPool, run: &MigrationRun) -> Result<RunRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO migration_runs
                (id, connection_id, status, language_id, currency_id,
                 currency_precision, sales_channel_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RunRow>(&query)
            .bind(run.id)
            .bind(run.connection_id)
            .bind(run.status.as_str())
            .bind(run.target.language_id)
            .bind(run.target.currency_id)
            .bind(run.target.currency_precision as i32)
            .bind(run.target.sales_channel_id)
            .bind(run.created_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: RunId) -> Result<Option<RunRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM migration_runs WHERE id = $1");
        sqlx::query_as::<_, RunRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Runs of a connection, newest first.
    pub async fn list_by_connection(
        pool: &PgPool,
        connection_id: ConnectionId,
    ) -> Result<Vec<RunRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM migration_runs
             WHERE connection_id = $1
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, RunRow>(&query)
            .bind(connection_id)
            .fetch_all(pool)
            .await
    }

    /// Returns `true` if a row was updated.
    pub async fn update_status(
        pool: &PgPool,
        id: RunId,
        status: RunStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE migration_runs SET status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
