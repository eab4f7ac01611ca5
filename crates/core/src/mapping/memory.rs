//! In-memory store and reference data, for tests and dry runs.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{MappingRow, MappingStore, NewMapping};
use crate::error::MigrationError;
use crate::reference::{Currency, Language, ReferenceData, RootCategory};
use crate::types::ConnectionId;

// ---------------------------------------------------------------------------
// InMemoryMappingStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryMappingStore {
    rows: RwLock<Vec<MappingRow>>,
}

impl InMemoryMappingStore {
    /// Snapshot of every stored row.
    pub async fn rows(&self) -> Vec<MappingRow> {
        self.rows.read().await.clone()
    }
}

fn matches(row: &MappingRow, connection_id: ConnectionId, entity: &str, old_id: &str) -> bool {
    row.connection_id == connection_id && row.entity == entity && row.old_identifier == old_id
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn insert(&self, rows: &[NewMapping]) -> Result<(), MigrationError> {
        let mut stored = self.rows.write().await;
        stored.extend(rows.iter().cloned().map(|r| MappingRow {
            id: Uuid::now_v7(),
            connection_id: r.connection_id,
            entity: r.entity,
            old_identifier: r.old_identifier,
            entity_uuid: r.entity_uuid,
            entity_value: r.entity_value,
            additional_data: r.additional_data,
        }));
        Ok(())
    }

    async fn find_first(
        &self,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
    ) -> Result<Option<MappingRow>, MigrationError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| matches(r, connection_id, entity, old_identifier))
            .cloned())
    }

    async fn find_all(
        &self,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
    ) -> Result<Vec<MappingRow>, MigrationError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| matches(r, connection_id, entity, old_identifier))
            .cloned()
            .collect())
    }

    async fn find_by_entity(
        &self,
        connection_id: ConnectionId,
        entity: &str,
    ) -> Result<Vec<MappingRow>, MigrationError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.connection_id == connection_id && r.entity == entity)
            .cloned()
            .collect())
    }

    async fn exists(
        &self,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
        entity_uuid: Uuid,
    ) -> Result<bool, MigrationError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().any(|r| {
            matches(r, connection_id, entity, old_identifier) && r.entity_uuid == Some(entity_uuid)
        }))
    }

    async fn find_id_by_entity_uuid(
        &self,
        connection_id: ConnectionId,
        entity_uuid: Uuid,
    ) -> Result<Option<Uuid>, MigrationError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| r.connection_id == connection_id && r.entity_uuid == Some(entity_uuid))
            .map(|r| r.id))
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), MigrationError> {
        self.rows.write().await.retain(|r| !ids.contains(&r.id));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryReferenceData
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ReferenceTables {
    languages: Vec<Language>,
    locales: Vec<(Uuid, String)>,
    currencies: Vec<Currency>,
    countries: Vec<(Uuid, String, String)>,
    taxes: Vec<(Uuid, f64)>,
    number_ranges: Vec<(Uuid, String)>,
    default_folders: Vec<(String, Option<Uuid>)>,
    thumbnail_sizes: Vec<(Uuid, u32, u32)>,
    cms_page: Option<Uuid>,
    rules: Vec<(Uuid, String)>,
    root_categories: Vec<RootCategory>,
}

/// Reference tables held in memory. Every `add_*` helper returns the id of
/// the created row.
#[derive(Default)]
pub struct InMemoryReferenceData {
    tables: RwLock<ReferenceTables>,
}

impl InMemoryReferenceData {
    /// Adds a language and its locale.
    pub async fn add_language(&self, name: &str, locale_code: &str) -> Language {
        let language = Language {
            id: Uuid::new_v4(),
            name: name.to_string(),
            locale_id: Uuid::new_v4(),
            locale_code: locale_code.to_string(),
        };
        self.tables.write().await.languages.push(language.clone());
        language
    }

    /// Adds a locale no language uses.
    pub async fn add_locale(&self, locale_code: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables
            .write()
            .await
            .locales
            .push((id, locale_code.to_string()));
        id
    }

    pub async fn add_currency(&self, iso_code: &str, factor: f64) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.currencies.push(Currency {
            id,
            iso_code: iso_code.to_string(),
            factor,
            symbol: iso_code.to_string(),
            decimal_precision: 2,
        });
        id
    }

    pub async fn add_country(&self, iso: &str, iso3: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables
            .write()
            .await
            .countries
            .push((id, iso.to_string(), iso3.to_string()));
        id
    }

    pub async fn add_tax(&self, rate: f64) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.taxes.push((id, rate));
        id
    }

    pub async fn add_number_range(&self, type_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables
            .write()
            .await
            .number_ranges
            .push((id, type_name.to_string()));
        id
    }

    /// Adds a default folder for `entity`, with or without a folder assigned.
    pub async fn add_default_folder(&self, entity: &str, folder_id: Option<Uuid>) {
        self.tables
            .write()
            .await
            .default_folders
            .push((entity.to_string(), folder_id));
    }

    pub async fn add_thumbnail_size(&self, width: u32, height: u32) -> Uuid {
        let id = Uuid::new_v4();
        self.tables
            .write()
            .await
            .thumbnail_sizes
            .push((id, width, height));
        id
    }

    pub async fn set_default_cms_page(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.cms_page = Some(id);
        id
    }

    pub async fn add_rule(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.rules.push((id, name.to_string()));
        id
    }

    pub async fn set_root_categories(&self, categories: Vec<RootCategory>) {
        self.tables.write().await.root_categories = categories;
    }
}

#[async_trait]
impl ReferenceData for InMemoryReferenceData {
    async fn locale_id_by_code(&self, code: &str) -> Result<Option<Uuid>, MigrationError> {
        let tables = self.tables.read().await;
        let from_language = tables
            .languages
            .iter()
            .find(|l| l.locale_code == code)
            .map(|l| l.locale_id);
        Ok(from_language.or_else(|| {
            tables
                .locales
                .iter()
                .find(|(_, c)| c == code)
                .map(|(id, _)| *id)
        }))
    }

    async fn language_id_by_locale(&self, locale_id: Uuid) -> Result<Option<Uuid>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables
            .languages
            .iter()
            .find(|l| l.locale_id == locale_id)
            .map(|l| l.id))
    }

    async fn language(&self, id: Uuid) -> Result<Option<Language>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables.languages.iter().find(|l| l.id == id).cloned())
    }

    async fn country_id_by_iso(
        &self,
        iso: &str,
        iso3: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables
            .countries
            .iter()
            .find(|(_, i, i3)| i == iso && i3 == iso3)
            .map(|(id, _, _)| *id))
    }

    async fn currency_id_by_iso_code(
        &self,
        iso_code: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables
            .currencies
            .iter()
            .find(|c| c.iso_code == iso_code)
            .map(|c| c.id))
    }

    async fn currency(&self, id: Uuid) -> Result<Option<Currency>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables.currencies.iter().find(|c| c.id == id).cloned())
    }

    async fn tax_id_by_rate(&self, rate: f64) -> Result<Option<Uuid>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables
            .taxes
            .iter()
            .find(|(_, r)| (*r - rate).abs() < f64::EPSILON)
            .map(|(id, _)| *id))
    }

    async fn number_range_id_by_type(
        &self,
        type_name: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables
            .number_ranges
            .iter()
            .find(|(_, t)| t == type_name)
            .map(|(id, _)| *id))
    }

    async fn default_folder_id(&self, entity: &str) -> Result<Option<Uuid>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables
            .default_folders
            .iter()
            .find(|(e, _)| e == entity)
            .and_then(|(_, folder)| *folder))
    }

    async fn thumbnail_size_id(
        &self,
        width: u32,
        height: u32,
    ) -> Result<Option<Uuid>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables
            .thumbnail_sizes
            .iter()
            .find(|(_, w, h)| *w == width && *h == height)
            .map(|(id, _, _)| *id))
    }

    async fn default_cms_page_id(&self) -> Result<Option<Uuid>, MigrationError> {
        Ok(self.tables.read().await.cms_page)
    }

    async fn rule_id_by_name(&self, name: &str) -> Result<Option<Uuid>, MigrationError> {
        let tables = self.tables.read().await;
        Ok(tables
            .rules
            .iter()
            .find(|(_, n)| n == name)
            .map(|(id, _)| *id))
    }

    async fn root_categories(&self) -> Result<Vec<RootCategory>, MigrationError> {
        Ok(self.tables.read().await.root_categories.clone())
    }
}
