//! Rows of the target reference tables that carry more than an id.

use shopmig_core::reference::{Currency, Language, RootCategory};
use sqlx::FromRow;
use uuid::Uuid;

/// A language joined with its locale.
#[derive(Debug, Clone, FromRow)]
pub struct LanguageRow {
    pub id: Uuid,
    pub name: String,
    pub locale_id: Uuid,
    pub locale_code: String,
}

impl From<LanguageRow> for Language {
    fn from(row: LanguageRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            locale_id: row.locale_id,
            locale_code: row.locale_code,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CurrencyRow {
    pub id: Uuid,
    pub iso_code: String,
    pub factor: f64,
    pub symbol: String,
    pub decimal_precision: i32,
}

impl From<CurrencyRow> for Currency {
    fn from(row: CurrencyRow) -> Self {
        Self {
            id: row.id,
            iso_code: row.iso_code,
            factor: row.factor,
            symbol: row.symbol,
            decimal_precision: row.decimal_precision.max(0) as u32,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RootCategoryRow {
    pub id: Uuid,
    pub position: i32,
}

impl From<RootCategoryRow> for RootCategory {
    fn from(row: RootCategoryRow) -> Self {
        Self {
            id: row.id,
            position: row.position,
        }
    }
}
