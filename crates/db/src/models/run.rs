//! Migration run rows.
//!
//! The target scope is stored flattened into the run row.

use serde::Serialize;
use shopmig_core::context::TargetScope;
use shopmig_core::run::{MigrationRun, RunStatus};
use shopmig_core::types::{ConnectionId, RunId, Timestamp};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunRow {
    pub id: RunId,
    pub connection_id: Option<ConnectionId>,
    pub status: String,
    pub language_id: Uuid,
    pub currency_id: Uuid,
    pub currency_precision: i32,
    pub sales_channel_id: Uuid,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RunRow {
    /// Convert into the core run. `None` if the stored status is unknown.
    pub fn into_run(self) -> Option<MigrationRun> {
        let status = RunStatus::from_str(&self.status)?;
        Some(MigrationRun {
            id: self.id,
            connection_id: self.connection_id,
            status,
            target: TargetScope {
                language_id: self.language_id,
                currency_id: self.currency_id,
                currency_precision: self.currency_precision.max(0) as u32,
                sales_channel_id: self.sales_channel_id,
            },
            created_at: self.created_at,
        })
    }
}
