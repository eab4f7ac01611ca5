//! Read-only lookups against target-system reference tables.
//!
//! Every query here is a plain equality filter with an implicit `LIMIT 1`;
//! caching and mapping persistence live in
//! [`MappingService`](crate::mapping::MappingService).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MigrationError;

/// A target-system language together with the code of its locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub id: Uuid,
    pub name: String,
    pub locale_id: Uuid,
    pub locale_code: String,
}

/// A target-system currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub id: Uuid,
    pub iso_code: String,
    pub factor: f64,
    pub symbol: String,
    pub decimal_precision: u32,
}

/// A category without parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCategory {
    pub id: Uuid,
    pub position: i32,
}

#[async_trait]
pub trait ReferenceData: Send + Sync {
    async fn locale_id_by_code(&self, code: &str) -> Result<Option<Uuid>, MigrationError>;

    async fn language_id_by_locale(&self, locale_id: Uuid) -> Result<Option<Uuid>, MigrationError>;

    async fn language(&self, id: Uuid) -> Result<Option<Language>, MigrationError>;

    async fn country_id_by_iso(&self, iso: &str, iso3: &str)
        -> Result<Option<Uuid>, MigrationError>;

    async fn currency_id_by_iso_code(&self, iso_code: &str)
        -> Result<Option<Uuid>, MigrationError>;

    async fn currency(&self, id: Uuid) -> Result<Option<Currency>, MigrationError>;

    async fn tax_id_by_rate(&self, rate: f64) -> Result<Option<Uuid>, MigrationError>;

    /// Number range whose type has the given technical name.
    async fn number_range_id_by_type(&self, type_name: &str)
        -> Result<Option<Uuid>, MigrationError>;

    /// Folder attached to the default media folder of `entity`; `None` if
    /// there is no default folder or it has no folder assigned.
    async fn default_folder_id(&self, entity: &str) -> Result<Option<Uuid>, MigrationError>;

    async fn thumbnail_size_id(&self, width: u32, height: u32)
        -> Result<Option<Uuid>, MigrationError>;

    /// The locked `product_list` CMS page.
    async fn default_cms_page_id(&self) -> Result<Option<Uuid>, MigrationError>;

    async fn rule_id_by_name(&self, name: &str) -> Result<Option<Uuid>, MigrationError>;

    async fn root_categories(&self) -> Result<Vec<RootCategory>, MigrationError>;
}
