//! Identifier mapping: the durable store contract and the caching,
//! write-behind [`MappingService`] layered over it.
//!
//! All identifier allocation must go through [`MappingService`]. The store
//! has no unique constraint on `(connection_id, entity, old_identifier)`;
//! single-valued uniqueness is kept by check-before-create in the service.

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities;
use crate::error::MigrationError;
use crate::reference::{Currency, Language, ReferenceData};
use crate::types::ConnectionId;

/// Old identifier of the default CMS page mapping.
pub const DEFAULT_CMS_PAGE: &str = "default_cms_page";
/// Name of the rule used as shipping method availability fallback.
pub const DEFAULT_AVAILABILITY_RULE_NAME: &str = "Cart >= 0";
/// Old identifier of the lowest root category mapping.
pub const LOWEST_ROOT_CATEGORY: &str = "lowest_root_category";

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A persisted mapping row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRow {
    pub id: Uuid,
    pub connection_id: ConnectionId,
    pub entity: String,
    pub old_identifier: String,
    pub entity_uuid: Option<Uuid>,
    pub entity_value: Option<String>,
    pub additional_data: Option<serde_json::Value>,
}

/// A mapping row waiting in the write buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMapping {
    pub connection_id: ConnectionId,
    pub entity: String,
    pub old_identifier: String,
    pub entity_uuid: Option<Uuid>,
    pub entity_value: Option<String>,
    pub additional_data: Option<serde_json::Value>,
}

impl NewMapping {
    pub fn identity(connection_id: ConnectionId, entity: &str, old_id: &str, uuid: Uuid) -> Self {
        Self {
            connection_id,
            entity: entity.to_string(),
            old_identifier: old_id.to_string(),
            entity_uuid: Some(uuid),
            entity_value: None,
            additional_data: None,
        }
    }

    pub fn value(connection_id: ConnectionId, entity: &str, old_id: &str, value: &str) -> Self {
        Self {
            connection_id,
            entity: entity.to_string(),
            old_identifier: old_id.to_string(),
            entity_uuid: None,
            entity_value: Some(value.to_string()),
            additional_data: None,
        }
    }

    fn key(&self) -> MappingKey {
        MappingKey::new(self.connection_id, &self.entity, &self.old_identifier)
    }
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Durable storage of mapping rows.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Insert all rows in one batch.
    async fn insert(&self, rows: &[NewMapping]) -> Result<(), MigrationError>;

    /// First row for the triple, in no particular order.
    async fn find_first(
        &self,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
    ) -> Result<Option<MappingRow>, MigrationError>;

    /// Every row for the triple (list-valued mappings).
    async fn find_all(
        &self,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
    ) -> Result<Vec<MappingRow>, MigrationError>;

    /// Every row of an entity type for one connection.
    async fn find_by_entity(
        &self,
        connection_id: ConnectionId,
        entity: &str,
    ) -> Result<Vec<MappingRow>, MigrationError>;

    /// Whether the exact `(triple, uuid)` tuple is stored.
    async fn exists(
        &self,
        connection_id: ConnectionId,
        entity: &str,
        old_identifier: &str,
        entity_uuid: Uuid,
    ) -> Result<bool, MigrationError>;

    /// Id of one row pointing at `entity_uuid`.
    async fn find_id_by_entity_uuid(
        &self,
        connection_id: ConnectionId,
        entity_uuid: Uuid,
    ) -> Result<Option<Uuid>, MigrationError>;

    async fn delete(&self, ids: &[Uuid]) -> Result<(), MigrationError>;
}

// ---------------------------------------------------------------------------
// MappingService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MappingKey {
    connection_id: ConnectionId,
    entity: String,
    old_identifier: String,
}

impl MappingKey {
    fn new(connection_id: ConnectionId, entity: &str, old_identifier: &str) -> Self {
        Self {
            connection_id,
            entity: entity.to_string(),
            old_identifier: old_identifier.to_string(),
        }
    }
}

/// Position in the write buffer, see [`MappingService::pending_mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMark(usize);

/// Run-scoped resolver and allocator of new identifiers.
///
/// One instance per migration run. Only positive lookups are cached; a miss
/// is asked again next time because another batch may have created the
/// entity in the meantime.
pub struct MappingService {
    store: Arc<dyn MappingStore>,
    reference: Arc<dyn ReferenceData>,
    uuids: HashMap<MappingKey, Uuid>,
    values: HashMap<MappingKey, String>,
    uuid_lists: HashMap<MappingKey, Vec<Uuid>>,
    sales_channels: HashMap<ConnectionId, Vec<Uuid>>,
    languages: HashMap<String, Uuid>,
    locales: HashMap<String, Uuid>,
    pending: Vec<NewMapping>,
    default_language: Option<Language>,
    default_currency: Option<Currency>,
    default_availability_rule: Option<Uuid>,
}

impl MappingService {
    pub fn new(store: Arc<dyn MappingStore>, reference: Arc<dyn ReferenceData>) -> Self {
        Self {
            store,
            reference,
            uuids: HashMap::new(),
            values: HashMap::new(),
            uuid_lists: HashMap::new(),
            sales_channels: HashMap::new(),
            languages: HashMap::new(),
            locales: HashMap::new(),
            pending: Vec::new(),
            default_language: None,
            default_currency: None,
            default_availability_rule: None,
        }
    }

    /// Number of rows waiting for [`flush`](Self::flush).
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> &[NewMapping] {
        &self.pending
    }

    // -- identity mappings ---------------------------------------------------

    /// Resolve the new uuid for an old identifier.
    pub async fn resolve_uuid(
        &mut self,
        connection_id: ConnectionId,
        entity: &str,
        old_id: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        let key = MappingKey::new(connection_id, entity, old_id);
        if let Some(uuid) = self.uuids.get(&key) {
            return Ok(Some(*uuid));
        }

        let row = self.store.find_first(connection_id, entity, old_id).await?;
        match row.and_then(|r| r.entity_uuid) {
            Some(uuid) => {
                self.uuids.insert(key, uuid);
                Ok(Some(uuid))
            }
            None => Ok(None),
        }
    }

    /// Return the existing uuid for the triple or allocate and buffer a new one.
    pub async fn create_uuid(
        &mut self,
        connection_id: ConnectionId,
        entity: &str,
        old_id: &str,
    ) -> Result<Uuid, MigrationError> {
        self.create_uuid_with(connection_id, entity, old_id, None, None)
            .await
    }

    /// [`create_uuid`](Self::create_uuid) with additional data and an
    /// optional caller-chosen uuid. Neither is applied if a mapping exists.
    pub async fn create_uuid_with(
        &mut self,
        connection_id: ConnectionId,
        entity: &str,
        old_id: &str,
        additional_data: Option<serde_json::Value>,
        explicit_uuid: Option<Uuid>,
    ) -> Result<Uuid, MigrationError> {
        if let Some(uuid) = self.resolve_uuid(connection_id, entity, old_id).await? {
            return Ok(uuid);
        }

        let uuid = explicit_uuid.unwrap_or_else(Uuid::new_v4);
        let mut row = NewMapping::identity(connection_id, entity, old_id, uuid);
        row.additional_data = additional_data;
        self.save_mapping(row);

        Ok(uuid)
    }

    /// Buffer an identity mapping with a known uuid.
    pub fn push_mapping(&mut self, connection_id: ConnectionId, entity: &str, old_id: &str, uuid: Uuid) {
        self.save_mapping(NewMapping::identity(connection_id, entity, old_id, uuid));
    }

    /// Every mapped uuid of an entity type.
    pub async fn uuids_by_entity(
        &self,
        connection_id: ConnectionId,
        entity: &str,
    ) -> Result<Vec<Uuid>, MigrationError> {
        let rows = self.store.find_by_entity(connection_id, entity).await?;
        Ok(rows.into_iter().filter_map(|r| r.entity_uuid).collect())
    }

    // -- value mappings -------------------------------------------------------

    pub async fn resolve_value(
        &mut self,
        connection_id: ConnectionId,
        entity: &str,
        old_id: &str,
    ) -> Result<Option<String>, MigrationError> {
        let key = MappingKey::new(connection_id, entity, old_id);
        if let Some(value) = self.values.get(&key) {
            return Ok(Some(value.clone()));
        }

        let row = self.store.find_first(connection_id, entity, old_id).await?;
        match row.and_then(|r| r.entity_value) {
            Some(value) => {
                self.values.insert(key, value.clone());
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn push_value_mapping(
        &mut self,
        connection_id: ConnectionId,
        entity: &str,
        old_id: &str,
        value: &str,
    ) {
        self.save_mapping(NewMapping::value(connection_id, entity, old_id, value));
    }

    // -- list mappings --------------------------------------------------------

    /// Add `uuid` to the list mapped from `old_id`.
    ///
    /// No-op if the exact tuple is already buffered or stored.
    pub async fn create_list_membership(
        &mut self,
        connection_id: ConnectionId,
        entity: &str,
        old_id: &str,
        uuid: Uuid,
        additional_data: Option<serde_json::Value>,
    ) -> Result<(), MigrationError> {
        let buffered = self.pending.iter().any(|row| {
            row.connection_id == connection_id
                && row.entity == entity
                && row.old_identifier == old_id
                && row.entity_uuid == Some(uuid)
        });
        if buffered || self.store.exists(connection_id, entity, old_id, uuid).await? {
            return Ok(());
        }

        let mut row = NewMapping::identity(connection_id, entity, old_id, uuid);
        row.additional_data = additional_data;
        self.pending.push(row);
        Ok(())
    }

    /// All uuids mapped from one old identifier, cached per triple.
    pub async fn resolve_uuid_list(
        &mut self,
        connection_id: ConnectionId,
        entity: &str,
        old_id: &str,
    ) -> Result<Vec<Uuid>, MigrationError> {
        let key = MappingKey::new(connection_id, entity, old_id);
        if let Some(list) = self.uuid_lists.get(&key) {
            return Ok(list.clone());
        }

        let rows = self.store.find_all(connection_id, entity, old_id).await?;
        let list: Vec<Uuid> = rows.into_iter().filter_map(|r| r.entity_uuid).collect();
        self.uuid_lists.insert(key, list.clone());
        Ok(list)
    }

    pub async fn migrated_sales_channel_uuids(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Vec<Uuid>, MigrationError> {
        if let Some(list) = self.sales_channels.get(&connection_id) {
            return Ok(list.clone());
        }

        let list = self
            .uuids_by_entity(connection_id, entities::SALES_CHANNEL)
            .await?;
        self.sales_channels.insert(connection_id, list.clone());
        Ok(list)
    }

    // -- deletion -------------------------------------------------------------

    /// Remove the mapping pointing at `entity_uuid` from the buffer, the
    /// cache and the store.
    pub async fn delete_mapping(
        &mut self,
        entity_uuid: Uuid,
        connection_id: ConnectionId,
    ) -> Result<(), MigrationError> {
        if let Some(pos) = self
            .pending
            .iter()
            .position(|r| r.connection_id == connection_id && r.entity_uuid == Some(entity_uuid))
        {
            self.pending.remove(pos);
        }
        self.uuids.retain(|_, uuid| *uuid != entity_uuid);

        if let Some(id) = self
            .store
            .find_id_by_entity_uuid(connection_id, entity_uuid)
            .await?
        {
            self.store.delete(&[id]).await?;
        }
        Ok(())
    }

    /// Delete mapping rows by their own ids. Bypasses the buffer.
    pub async fn bulk_delete(&self, ids: &[Uuid]) -> Result<(), MigrationError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store.delete(ids).await
    }

    /// Current end of the write buffer.
    pub fn pending_mark(&self) -> PendingMark {
        PendingMark(self.pending.len())
    }

    /// Drop every mapping buffered after `mark` and forget their cache
    /// entries. Returns how many rows were dropped.
    pub fn discard_pending_since(&mut self, mark: PendingMark) -> usize {
        if mark.0 >= self.pending.len() {
            return 0;
        }

        let dropped: Vec<NewMapping> = self.pending.drain(mark.0..).collect();
        for row in &dropped {
            let key = row.key();
            if let Some(uuid) = row.entity_uuid {
                if self.uuids.get(&key) == Some(&uuid) {
                    self.uuids.remove(&key);
                }
                // Memoized lookups must push their row again next time.
                if row.entity == entities::LANGUAGE
                    && self.languages.get(&row.old_identifier) == Some(&uuid)
                {
                    self.languages.remove(&row.old_identifier);
                }
                if row.entity == entities::RULE
                    && row.old_identifier == DEFAULT_AVAILABILITY_RULE_NAME
                    && self.default_availability_rule == Some(uuid)
                {
                    self.default_availability_rule = None;
                }
            }
            if let Some(value) = &row.entity_value {
                if self.values.get(&key) == Some(value) {
                    self.values.remove(&key);
                }
            }
        }
        dropped.len()
    }

    /// Write the buffer to the store in one batch.
    ///
    /// On success the buffer and the positive-hit caches are cleared; list
    /// caches are kept. On failure the buffer is left intact.
    pub async fn flush(&mut self) -> Result<usize, MigrationError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        self.store.insert(&self.pending).await?;
        let written = self.pending.len();
        tracing::debug!(rows = written, "Mapping buffer flushed");

        self.pending.clear();
        self.uuids.clear();
        self.values.clear();
        Ok(written)
    }

    // -- reference lookups ----------------------------------------------------

    /// Locale id for a locale code; unknown codes are an error.
    pub async fn locale_uuid(
        &mut self,
        connection_id: ConnectionId,
        locale_code: &str,
    ) -> Result<Uuid, MigrationError> {
        if let Some(uuid) = self.locales.get(locale_code) {
            return Ok(*uuid);
        }

        let uuid = match self
            .resolve_uuid(connection_id, entities::LOCALE, locale_code)
            .await?
        {
            Some(uuid) => uuid,
            None => self.search_locale(locale_code).await?,
        };
        self.locales.insert(locale_code.to_string(), uuid);
        Ok(uuid)
    }

    /// Language whose locale has the given code.
    ///
    /// `Ok(None)` if the locale exists but no language uses it;
    /// [`MigrationError::LocaleNotFound`] if the locale itself is unknown.
    pub async fn language_uuid(
        &mut self,
        connection_id: ConnectionId,
        locale_code: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        if let Some(uuid) = self.languages.get(locale_code) {
            return Ok(Some(*uuid));
        }

        if let Some(uuid) = self
            .resolve_uuid(connection_id, entities::LANGUAGE, locale_code)
            .await?
        {
            self.languages.insert(locale_code.to_string(), uuid);
            return Ok(Some(uuid));
        }

        let locale_id = self.search_locale(locale_code).await?;
        let Some(uuid) = self.reference.language_id_by_locale(locale_id).await? else {
            return Ok(None);
        };

        self.languages.insert(locale_code.to_string(), uuid);
        self.push_mapping(connection_id, entities::LANGUAGE, locale_code, uuid);
        Ok(Some(uuid))
    }

    /// The system language, loaded once per run.
    pub async fn default_language(&mut self, language_id: Uuid) -> Result<Language, MigrationError> {
        if let Some(language) = &self.default_language {
            return Ok(language.clone());
        }

        let language = self
            .reference
            .language(language_id)
            .await?
            .ok_or(MigrationError::EntityNotExists {
                entity: entities::LANGUAGE,
                id: language_id,
            })?;
        self.default_language = Some(language.clone());
        Ok(language)
    }

    /// The system currency, loaded once per run.
    pub async fn default_currency(&mut self, currency_id: Uuid) -> Result<Currency, MigrationError> {
        if let Some(currency) = &self.default_currency {
            return Ok(currency.clone());
        }

        let currency = self
            .reference
            .currency(currency_id)
            .await?
            .ok_or(MigrationError::EntityNotExists {
                entity: entities::CURRENCY,
                id: currency_id,
            })?;
        self.default_currency = Some(currency.clone());
        Ok(currency)
    }

    pub async fn country_uuid(
        &mut self,
        connection_id: ConnectionId,
        old_id: &str,
        iso: &str,
        iso3: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        if let Some(uuid) = self
            .resolve_uuid(connection_id, entities::COUNTRY, old_id)
            .await?
        {
            return Ok(Some(uuid));
        }

        let found = self.reference.country_id_by_iso(iso, iso3).await?;
        Ok(self.remember(connection_id, entities::COUNTRY, old_id, found))
    }

    pub async fn currency_uuid(
        &mut self,
        connection_id: ConnectionId,
        iso_code: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        if let Some(uuid) = self
            .resolve_uuid(connection_id, entities::CURRENCY, iso_code)
            .await?
        {
            return Ok(Some(uuid));
        }

        let found = self.currency_uuid_without_mapping(iso_code).await?;
        Ok(self.remember(connection_id, entities::CURRENCY, iso_code, found))
    }

    pub async fn currency_uuid_without_mapping(
        &self,
        iso_code: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        self.reference.currency_id_by_iso_code(iso_code).await
    }

    /// Tax with the given rate. The rate's shortest decimal form is the old
    /// identifier, so 19.0 and 19 share one mapping.
    pub async fn tax_uuid(
        &mut self,
        connection_id: ConnectionId,
        rate: f64,
    ) -> Result<Option<Uuid>, MigrationError> {
        let old_id = rate.to_string();
        if let Some(uuid) = self
            .resolve_uuid(connection_id, entities::TAX, &old_id)
            .await?
        {
            return Ok(Some(uuid));
        }

        let found = self.reference.tax_id_by_rate(rate).await?;
        Ok(self.remember(connection_id, entities::TAX, &old_id, found))
    }

    pub async fn number_range_uuid(
        &mut self,
        connection_id: ConnectionId,
        type_name: &str,
        old_id: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        if let Some(uuid) = self
            .resolve_uuid(connection_id, entities::NUMBER_RANGE, old_id)
            .await?
        {
            return Ok(Some(uuid));
        }

        let found = self.reference.number_range_id_by_type(type_name).await?;
        Ok(self.remember(connection_id, entities::NUMBER_RANGE, old_id, found))
    }

    pub async fn default_folder_uuid(
        &mut self,
        connection_id: ConnectionId,
        entity: &str,
    ) -> Result<Option<Uuid>, MigrationError> {
        if let Some(uuid) = self
            .resolve_uuid(connection_id, entities::MEDIA_DEFAULT_FOLDER, entity)
            .await?
        {
            return Ok(Some(uuid));
        }

        let found = self.reference.default_folder_id(entity).await?;
        Ok(self.remember(connection_id, entities::MEDIA_DEFAULT_FOLDER, entity, found))
    }

    pub async fn thumbnail_size_uuid(
        &mut self,
        connection_id: ConnectionId,
        width: u32,
        height: u32,
    ) -> Result<Option<Uuid>, MigrationError> {
        let size = format!("{width}-{height}");
        if let Some(uuid) = self
            .resolve_uuid(connection_id, entities::MEDIA_THUMBNAIL_SIZE, &size)
            .await?
        {
            return Ok(Some(uuid));
        }

        let found = self.reference.thumbnail_size_id(width, height).await?;
        Ok(self.remember(connection_id, entities::MEDIA_THUMBNAIL_SIZE, &size, found))
    }

    pub async fn default_cms_page_uuid(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Option<Uuid>, MigrationError> {
        if let Some(uuid) = self
            .resolve_uuid(connection_id, entities::CMS_PAGE, DEFAULT_CMS_PAGE)
            .await?
        {
            return Ok(Some(uuid));
        }

        let found = self.reference.default_cms_page_id().await?;
        Ok(self.remember(connection_id, entities::CMS_PAGE, DEFAULT_CMS_PAGE, found))
    }

    /// The `Cart >= 0` rule, memoized for the run.
    pub async fn default_availability_rule(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Option<Uuid>, MigrationError> {
        if let Some(uuid) = self.default_availability_rule {
            return Ok(Some(uuid));
        }

        let found = match self
            .resolve_uuid(connection_id, entities::RULE, DEFAULT_AVAILABILITY_RULE_NAME)
            .await?
        {
            Some(uuid) => Some(uuid),
            None => {
                let found = self
                    .reference
                    .rule_id_by_name(DEFAULT_AVAILABILITY_RULE_NAME)
                    .await?;
                self.remember(
                    connection_id,
                    entities::RULE,
                    DEFAULT_AVAILABILITY_RULE_NAME,
                    found,
                )
            }
        };
        self.default_availability_rule = found;
        Ok(found)
    }

    /// Root category with the highest position.
    pub async fn lowest_root_category_uuid(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Option<Uuid>, MigrationError> {
        if let Some(uuid) = self
            .resolve_uuid(connection_id, entities::ROOT_CATEGORY, LOWEST_ROOT_CATEGORY)
            .await?
        {
            return Ok(Some(uuid));
        }

        let roots = self.reference.root_categories().await?;
        let found = roots.iter().max_by_key(|c| c.position).map(|c| c.id);
        Ok(self.remember(
            connection_id,
            entities::ROOT_CATEGORY,
            LOWEST_ROOT_CATEGORY,
            found,
        ))
    }

    // -- internals ------------------------------------------------------------

    fn save_mapping(&mut self, row: NewMapping) {
        let key = row.key();
        if let Some(uuid) = row.entity_uuid {
            self.uuids.insert(key, uuid);
        } else if let Some(value) = &row.entity_value {
            self.values.insert(key, value.clone());
        }
        self.pending.push(row);
    }

    /// Buffer a mapping for a reference lookup hit and pass the result on.
    fn remember(
        &mut self,
        connection_id: ConnectionId,
        entity: &str,
        old_id: &str,
        found: Option<Uuid>,
    ) -> Option<Uuid> {
        if let Some(uuid) = found {
            self.push_mapping(connection_id, entity, old_id, uuid);
        }
        found
    }

    async fn search_locale(&self, locale_code: &str) -> Result<Uuid, MigrationError> {
        self.reference
            .locale_id_by_code(locale_code)
            .await?
            .ok_or_else(|| MigrationError::LocaleNotFound(locale_code.to_string()))
    }
}
