//! Migration log rows. Append-only, no `updated_at`.

use serde::Serialize;
use shopmig_core::types::{RunId, Timestamp};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LogRow {
    pub id: i64,
    pub run_id: RunId,
    pub level: String,
    pub log_type: String,
    pub title: String,
    pub description: String,
    pub details: serde_json::Value,
    pub count: i32,
    pub created_at: Timestamp,
}
