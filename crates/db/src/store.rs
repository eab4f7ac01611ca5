//! Postgres implementations of the `shopmig-core` storage traits.
//!
//! Every adapter owns a cloned [`DbPool`] and maps `sqlx::Error` into
//! [`MigrationError::Store`].

use async_trait::async_trait;
use shopmig_core::context::MigrationConnection;
use shopmig_core::error::MigrationError;
use shopmig_core::fetcher::{ConvertedDataWriter, ConvertedRecord};
use shopmig_core::logging::{LogEntry, LogSink};
use shopmig_core::mapping::{MappingRow, MappingStore, NewMapping};
use shopmig_core::media::{MediaFileRequest, MediaFileSink};
use shopmig_core::reference::{Currency, Language, ReferenceData, RootCategory};
use shopmig_core::run::{MigrationRun, RunStatus, RunStore};
use shopmig_core::types::{ConnectionId, RunId};
use uuid::Uuid;

use crate::repositories::{
    ConnectionRepo, DataRepo, LogRepo, MappingRepo, MediaFileRepo, ReferenceRepo, RunRepo,
};
use crate::DbPool;

fn store_err(e: sqlx::Error) -> MigrationError {
    MigrationError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgMappingStore {
    pool: DbPool,
}

impl PgMappingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingStore for PgMappingStore {
    async fn insert(&self, rows: &[NewMapping]) -> Result<(), MigrationError> {
        let inserted = MappingRepo::batch_insert(&self.pool, rows)
            .await
            .map_err(store_err)?;
        tracing::debug!(inserted, "Mappings written");
        Ok(())
    }

    async fn find_first(
        &self,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
    ) -> Result<Option<MappingRow>, MigrationError> {
        let record = MappingRepo::find_first(&self.pool, connection_id, entity, old_identifier)
            .await
            .map_err(store_err)?;
        Ok(record.map(MappingRow::from))
    }

    async fn find_all(
        &self,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
    ) -> Result<Vec<MappingRow>, MigrationError> {
        let records = MappingRepo::find_all(&self.pool, connection_id, entity, old_identifier)
            .await
            .map_err(store_err)?;
        Ok(records.into_iter().map(MappingRow::from).collect())
    }

    async fn find_by_entity(
        &self,
        connection_id: ConnectionId,
        entity: &str,
    ) -> Result<Vec<MappingRow>, MigrationError> {
        let records = MappingRepo::find_by_entity(&self.pool, connection_id, entity)
            .await
            .map_err(store_err)?;
        Ok(records.into_iter().map(MappingRow::from).collect())
    }

    async fn exists(
        &self,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
        entity_uuid: Uuid,
    ) -> Result<bool, MigrationError> {
        MappingRepo::exists(&self.pool, connection_id, entity, old_identifier, entity_uuid)
            .await
            .map_err(store_err)
    }

    async fn find_id_by_entity_uuid(
        &self,
        connection_id: ConnectionId,
        entity_uuid: Uuid,
    ) -> Result<Option<Uuid>, MigrationError> {
        MappingRepo::find_id_by_entity_uuid(&self.pool, connection_id, entity_uuid)
            .await
            .map_err(store_err)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), MigrationError> {
        MappingRepo::delete_by_ids(&self.pool, ids)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgReferenceData {
    pool: DbPool,
}

impl PgReferenceData {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceData for PgReferenceData {
    async fn locale_id_by_code(&self, code: &str) -> Result<Option<Uuid>, MigrationError> {
        ReferenceRepo::locale_id_by_code(&self.pool, code)
            .await
            .map_err(store_err)
    }

    async fn language_id_by_locale(&self, locale_id: Uuid) -> Result<Option<Uuid>, MigrationError> {
        ReferenceRepo::language_id_by_locale(&self.pool, locale_id)
            .await
            .map_err(store_err)
    }

    async fn language(&self, id: Uuid) -> Result<Option<Language>, MigrationError> {
        let row = ReferenceRepo::language_by_id(&self.pool, id)
            .await
            .map_err(store_err)?;
        Ok(row.map(Language::from))
    }

    async fn country_id_by_iso(
        &self,
        iso: &str,
        iso3: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        ReferenceRepo::country_id_by_iso(&self.pool, iso, iso3)
            .await
            .map_err(store_err)
    }

    async fn currency_id_by_iso_code(
        &self,
        iso_code: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        ReferenceRepo::currency_id_by_iso_code(&self.pool, iso_code)
            .await
            .map_err(store_err)
    }

    async fn currency(&self, id: Uuid) -> Result<Option<Currency>, MigrationError> {
        let row = ReferenceRepo::currency_by_id(&self.pool, id)
            .await
            .map_err(store_err)?;
        Ok(row.map(Currency::from))
    }

    async fn tax_id_by_rate(&self, rate: f64) -> Result<Option<Uuid>, MigrationError> {
        ReferenceRepo::tax_id_by_rate(&self.pool, rate)
            .await
            .map_err(store_err)
    }

    async fn number_range_id_by_type(
        &self,
        type_name: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        ReferenceRepo::number_range_id_by_type(&self.pool, type_name)
            .await
            .map_err(store_err)
    }

    async fn default_folder_id(&self, entity: &str) -> Result<Option<Uuid>, MigrationError> {
        ReferenceRepo::default_folder_id(&self.pool, entity)
            .await
            .map_err(store_err)
    }

    async fn thumbnail_size_id(
        &self,
        width: u32,
        height: u32,
    ) -> Result<Option<Uuid>, MigrationError> {
        let (Ok(width), Ok(height)) = (i32::try_from(width), i32::try_from(height)) else {
            return Ok(None);
        };
        ReferenceRepo::thumbnail_size_id(&self.pool, width, height)
            .await
            .map_err(store_err)
    }

    async fn default_cms_page_id(&self) -> Result<Option<Uuid>, MigrationError> {
        ReferenceRepo::default_cms_page_id(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn rule_id_by_name(&self, name: &str) -> Result<Option<Uuid>, MigrationError> {
        ReferenceRepo::rule_id_by_name(&self.pool, name)
            .await
            .map_err(store_err)
    }

    async fn root_categories(&self) -> Result<Vec<RootCategory>, MigrationError> {
        let rows = ReferenceRepo::root_categories(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(RootCategory::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Log, media and converted data sinks
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgLogSink {
    pool: DbPool,
}

impl PgLogSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogSink for PgLogSink {
    async fn write(&self, entries: &[LogEntry]) -> Result<(), MigrationError> {
        LogRepo::batch_insert(&self.pool, entries)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgMediaFileSink {
    pool: DbPool,
}

impl PgMediaFileSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaFileSink for PgMediaFileSink {
    async fn save(&self, files: &[MediaFileRequest]) -> Result<(), MigrationError> {
        MediaFileRepo::batch_insert(&self.pool, files)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgConvertedDataWriter {
    pool: DbPool,
}

impl PgConvertedDataWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConvertedDataWriter for PgConvertedDataWriter {
    async fn write(&self, records: &[ConvertedRecord]) -> Result<(), MigrationError> {
        DataRepo::batch_insert(&self.pool, records)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgRunStore {
    pool: DbPool,
}

impl PgRunStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn find_run(&self, id: RunId) -> Result<Option<MigrationRun>, MigrationError> {
        let Some(row) = RunRepo::find_by_id(&self.pool, id).await.map_err(store_err)? else {
            return Ok(None);
        };
        let status = row.status.clone();
        row.into_run()
            .map(Some)
            .ok_or_else(|| MigrationError::Store(format!("Unknown status {status} of run {id}")))
    }

    async fn find_connection(
        &self,
        id: ConnectionId,
    ) -> Result<Option<MigrationConnection>, MigrationError> {
        let row = ConnectionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_err)?;
        Ok(row.map(MigrationConnection::from))
    }

    async fn update_status(&self, id: RunId, status: RunStatus) -> Result<(), MigrationError> {
        let updated = RunRepo::update_status(&self.pool, id, status)
            .await
            .map_err(store_err)?;
        if !updated {
            return Err(MigrationError::EntityNotExists {
                entity: "migration_run",
                id,
            });
        }
        Ok(())
    }
}
