//! Repository for the `migration_connections` table.

use shopmig_core::types::ConnectionId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::connection::{ConnectionRow, CreateConnection};

const COLUMNS: &str = "id, name, profile_name, gateway_name, created_at";

/// Provides CRUD operations for migration connections.
pub struct ConnectionRepo;

impl ConnectionRepo {
    /// Insert a new connection with a fresh id, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateConnection,
    ) -> Result<ConnectionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO migration_connections (id, name, profile_name, gateway_name)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ConnectionRow>(&query)
            .bind(Uuid::now_v7())
            .bind(&input.name)
            .bind(&input.profile_name)
            .bind(&input.gateway_name)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: ConnectionId,
    ) -> Result<Option<ConnectionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM migration_connections WHERE id = $1");
        sqlx::query_as::<_, ConnectionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a connection. Its mappings go with it; its runs are kept with
    /// a null connection.
    pub async fn delete(pool: &PgPool, id: ConnectionId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM migration_connections WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
