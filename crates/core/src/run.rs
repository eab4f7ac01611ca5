//! Migration runs: status, lookup contract, and the driver that pages through
//! a data selection.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::context::{MigrationConnection, MigrationContext, TargetScope};
use crate::data_selection::DataSelection;
use crate::error::MigrationError;
use crate::fetcher::MigrationDataFetcher;
use crate::gateway::EnvironmentInformation;
use crate::services::RunServices;
use crate::types::{ConnectionId, RunId, Timestamp};

/// Records requested from the gateway per page.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
    Aborted,
}

impl RunStatus {
    pub const ALL: &'static [RunStatus] = &[Self::Running, Self::Finished, Self::Aborted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.as_str() == s)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRun {
    pub id: RunId,
    /// `None` once the connection has been deleted.
    pub connection_id: Option<ConnectionId>,
    pub status: RunStatus,
    pub target: TargetScope,
    pub created_at: Timestamp,
}

impl MigrationRun {
    pub fn new(connection_id: Option<ConnectionId>, target: TargetScope) -> Self {
        Self {
            id: Uuid::now_v7(),
            connection_id,
            status: RunStatus::Running,
            target,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn find_run(&self, id: RunId) -> Result<Option<MigrationRun>, MigrationError>;

    async fn find_connection(
        &self,
        id: ConnectionId,
    ) -> Result<Option<MigrationConnection>, MigrationError>;

    async fn update_status(&self, id: RunId, status: RunStatus) -> Result<(), MigrationError>;
}

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, MigrationRun>>,
    connections: RwLock<HashMap<ConnectionId, MigrationConnection>>,
}

impl InMemoryRunStore {
    pub async fn add_connection(&self, connection: MigrationConnection) {
        self.connections
            .write()
            .await
            .insert(connection.id, connection);
    }

    pub async fn add_run(&self, run: MigrationRun) {
        self.runs.write().await.insert(run.id, run);
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn find_run(&self, id: RunId) -> Result<Option<MigrationRun>, MigrationError> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn find_connection(
        &self,
        id: ConnectionId,
    ) -> Result<Option<MigrationConnection>, MigrationError> {
        Ok(self.connections.read().await.get(&id).cloned())
    }

    async fn update_status(&self, id: RunId, status: RunStatus) -> Result<(), MigrationError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&id).ok_or(MigrationError::EntityNotExists {
            entity: "migration_run",
            id,
        })?;
        run.status = status;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Per-entity counts of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub environment: Option<EnvironmentInformation>,
    /// Records read from the gateway per entity.
    pub read: BTreeMap<String, usize>,
    /// Records converted per entity.
    pub converted: BTreeMap<String, usize>,
    /// Code of the error that aborted the run.
    pub error: Option<String>,
}

impl RunReport {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            environment: None,
            read: BTreeMap::new(),
            converted: BTreeMap::new(),
            error: None,
        }
    }

    pub fn converted_count(&self, entity: &str) -> usize {
        self.converted.get(entity).copied().unwrap_or(0)
    }
}

/// Drives the data fetcher over every data set of a selection, page by page.
///
/// Data sets run sequentially in selection order; pages within a data set
/// run sequentially as well. The caller persists the final status.
pub struct MigrationRunner {
    fetcher: MigrationDataFetcher,
    page_size: u64,
}

impl MigrationRunner {
    pub fn new(fetcher: MigrationDataFetcher) -> Self {
        Self {
            fetcher,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn run(
        &self,
        run: &MigrationRun,
        connection: &MigrationConnection,
        selection: &DataSelection,
        services: &mut RunServices,
    ) -> RunReport {
        let mut report = RunReport::new(run.id);
        tracing::info!(
            run_id = %run.id,
            connection = %connection.name,
            selection = selection.id,
            "Migration run started",
        );

        for data_set in &selection.data_sets {
            let base = MigrationContext::new(connection.clone(), run.id, *data_set, run.target);

            if report.environment.is_none() {
                match self.fetcher.gateway().read_environment_information(&base).await {
                    Ok(info) => report.environment = Some(info),
                    Err(e) => {
                        tracing::warn!(run_id = %run.id, error = %e, "Environment information unavailable");
                    }
                }
            }

            let mut offset = 0;
            loop {
                let ctx = base.with_window(offset, self.page_size);
                let batch = match self.fetcher.fetch_batch(&ctx, services).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::error!(
                            run_id = %run.id,
                            entity = data_set.entity,
                            offset,
                            error = %e,
                            "Migration run aborted",
                        );
                        report.status = RunStatus::Aborted;
                        report.error = Some(e.code().to_string());
                        return report;
                    }
                };
                if batch.read == 0 {
                    break;
                }

                *report.read.entry(data_set.entity.to_string()).or_default() += batch.read;
                *report
                    .converted
                    .entry(data_set.entity.to_string())
                    .or_default() += batch.converted;
                offset += batch.read as u64;
            }
        }

        report.status = RunStatus::Finished;
        tracing::info!(
            run_id = %run.id,
            converted = report.converted.values().sum::<usize>(),
            "Migration run finished",
        );
        report
    }
}
