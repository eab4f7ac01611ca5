//! Read-only lookups against the target reference tables.
//!
//! Every lookup is an equality filter returning at most one row.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::reference::{CurrencyRow, LanguageRow, RootCategoryRow};

/// Technical name of the CMS page type used as default product listing.
const PRODUCT_LIST_PAGE_TYPE: &str = "product_list";

pub struct ReferenceRepo;

impl ReferenceRepo {
    // -- locales and languages ----------------------------------------------

    pub async fn locale_id_by_code(pool: &PgPool, code: &str) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM locales WHERE code = $1 LIMIT 1")
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    pub async fn language_id_by_locale(
        pool: &PgPool,
        locale_id: Uuid,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM languages WHERE locale_id = $1 LIMIT 1")
            .bind(locale_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn language_by_id(pool: &PgPool, id: Uuid) -> Result<Option<LanguageRow>, sqlx::Error> {
        sqlx::query_as::<_, LanguageRow>(
            "SELECT l.id, l.name, l.locale_id, lc.code AS locale_code
             FROM languages l
             JOIN locales lc ON lc.id = l.locale_id
             WHERE l.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    // -- countries, currencies and taxes -------------------------------------

    pub async fn country_id_by_iso(
        pool: &PgPool,
        iso: &str,
        iso3: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM countries WHERE iso = $1 AND iso3 = $2 LIMIT 1",
        )
        .bind(iso)
        .bind(iso3)
        .fetch_optional(pool)
        .await
    }

    pub async fn currency_id_by_iso_code(
        pool: &PgPool,
        iso_code: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM currencies WHERE iso_code = $1 LIMIT 1")
            .bind(iso_code)
            .fetch_optional(pool)
            .await
    }

    pub async fn currency_by_id(pool: &PgPool, id: Uuid) -> Result<Option<CurrencyRow>, sqlx::Error> {
        sqlx::query_as::<_, CurrencyRow>(
            "SELECT id, iso_code, factor, symbol, decimal_precision FROM currencies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn tax_id_by_rate(pool: &PgPool, rate: f64) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM taxes WHERE tax_rate = $1 LIMIT 1")
            .bind(rate)
            .fetch_optional(pool)
            .await
    }

    // -- number ranges, media and CMS ----------------------------------------

    pub async fn number_range_id_by_type(
        pool: &PgPool,
        type_name: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM number_ranges WHERE type_technical_name = $1 LIMIT 1",
        )
        .bind(type_name)
        .fetch_optional(pool)
        .await
    }

    /// `None` both when no default folder exists and when it has no folder.
    pub async fn default_folder_id(pool: &PgPool, entity: &str) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT folder_id FROM media_default_folders WHERE entity = $1 LIMIT 1",
        )
        .bind(entity)
        .fetch_optional(pool)
        .await
        .map(Option::flatten)
    }

    pub async fn thumbnail_size_id(
        pool: &PgPool,
        width: i32,
        height: i32,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM media_thumbnail_sizes WHERE width = $1 AND height = $2 LIMIT 1",
        )
        .bind(width)
        .bind(height)
        .fetch_optional(pool)
        .await
    }

    pub async fn default_cms_page_id(pool: &PgPool) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM cms_pages WHERE page_type = $1 AND locked LIMIT 1",
        )
        .bind(PRODUCT_LIST_PAGE_TYPE)
        .fetch_optional(pool)
        .await
    }

    // -- rules and categories ------------------------------------------------

    pub async fn rule_id_by_name(pool: &PgPool, name: &str) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM rules WHERE name = $1 LIMIT 1")
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    pub async fn root_categories(pool: &PgPool) -> Result<Vec<RootCategoryRow>, sqlx::Error> {
        sqlx::query_as::<_, RootCategoryRow>(
            "SELECT id, position FROM categories WHERE parent_id IS NULL ORDER BY position",
        )
        .fetch_all(pool)
        .await
    }
}
