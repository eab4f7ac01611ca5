//! Per-run and per-batch context threaded through every conversion call.
//!
//! Nothing in here is persisted; the context only lives for the duration of
//! one fetch/convert cycle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data_selection::DataSet;
use crate::types::{ConnectionId, RunId};

/// Default number of decimal places for currency amounts.
pub const DEFAULT_CURRENCY_PRECISION: u32 = 2;

/// A configured source system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConnection {
    pub id: ConnectionId,
    pub name: String,
    pub profile_name: String,
    pub gateway_name: String,
}

/// Target-system defaults the converters fall back to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetScope {
    /// The system language; records in its locale are merged into the main
    /// record instead of producing a translation.
    pub language_id: Uuid,
    pub currency_id: Uuid,
    pub currency_precision: u32,
    pub sales_channel_id: Uuid,
}

impl TargetScope {
    pub fn new(language_id: Uuid, currency_id: Uuid, sales_channel_id: Uuid) -> Self {
        Self {
            language_id,
            currency_id,
            currency_precision: DEFAULT_CURRENCY_PRECISION,
            sales_channel_id,
        }
    }
}

/// Context for one (run, data set, page) unit of work.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    pub connection: MigrationConnection,
    pub run_id: RunId,
    pub data_set: DataSet,
    pub offset: u64,
    pub limit: u64,
    pub target: TargetScope,
}

impl MigrationContext {
    pub fn new(
        connection: MigrationConnection,
        run_id: RunId,
        data_set: DataSet,
        target: TargetScope,
    ) -> Self {
        Self {
            connection,
            run_id,
            data_set,
            offset: 0,
            limit: 100,
            target,
        }
    }

    /// Return a copy of this context pointing at another page window.
    pub fn with_window(&self, offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit,
            ..self.clone()
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id
    }

    pub fn profile_name(&self) -> &str {
        &self.connection.profile_name
    }

    pub fn entity(&self) -> &'static str {
        self.data_set.entity
    }
}
