//! Converted data envelopes.

use serde::Serialize;
use shopmig_core::types::{RunId, Timestamp};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DataRow {
    pub id: Uuid,
    pub run_id: RunId,
    pub entity: String,
    pub old_identifier: Option<String>,
    pub converted: Option<serde_json::Value>,
    pub unmapped: Option<serde_json::Value>,
    pub created_at: Timestamp,
}
