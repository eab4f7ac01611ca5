//! Identifier mapping rows.

use serde::Serialize;
use shopmig_core::mapping::MappingRow;
use shopmig_core::types::{ConnectionId, Timestamp};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MappingRecord {
    pub id: Uuid,
    pub connection_id: ConnectionId,
    pub entity: String,
    pub old_identifier: String,
    pub entity_uuid: Option<Uuid>,
    pub entity_value: Option<String>,
    pub additional_data: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

impl From<MappingRecord> for MappingRow {
    fn from(record: MappingRecord) -> Self {
        Self {
            id: record.id,
            connection_id: record.connection_id,
            entity: record.entity,
            old_identifier: record.old_identifier,
            entity_uuid: record.entity_uuid,
            entity_value: record.entity_value,
            additional_data: record.additional_data,
        }
    }
}
