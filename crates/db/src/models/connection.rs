//! Migration connection rows.

use serde::{Deserialize, Serialize};
use shopmig_core::context::MigrationConnection;
use shopmig_core::types::{ConnectionId, Timestamp};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConnectionRow {
    pub id: ConnectionId,
    pub name: String,
    pub profile_name: String,
    pub gateway_name: String,
    pub created_at: Timestamp,
}

impl From<ConnectionRow> for MigrationConnection {
    fn from(row: ConnectionRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            profile_name: row.profile_name,
            gateway_name: row.gateway_name,
        }
    }
}

/// DTO for registering a source system.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateConnection {
    pub name: String,
    pub profile_name: String,
    pub gateway_name: String,
}
