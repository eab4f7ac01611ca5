//! Media download queue rows.

use serde::Serialize;
use shopmig_core::types::{RunId, Timestamp};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MediaFileRow {
    pub id: Uuid,
    pub run_id: RunId,
    pub uri: String,
    pub file_name: String,
    pub file_size: i64,
    pub media_id: Uuid,
    pub processed: bool,
    pub process_failure: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
