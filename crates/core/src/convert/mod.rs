//! Converters from legacy records to target-schema records.
//!
//! Each converter owns one `(profile, entity)` pair. A converter returns
//! `converted = None` for data-quality problems it has already logged, and
//! `Err` only for structural failures the orchestrator must record.

pub mod attribute;
pub mod category;
pub mod customer;
pub mod customer_group;
pub mod media;
pub mod order;
pub mod product;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::services::RunServices;
use crate::types::{RawRecord, TargetRecord};

pub use registry::ConverterRegistry;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Result of converting one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertStruct {
    pub converted: Option<TargetRecord>,
    /// Source fields without a target equivalent; `None` when nothing is left.
    pub unmapped: Option<RawRecord>,
}

impl ConvertStruct {
    pub fn new(converted: TargetRecord, unmapped: RawRecord) -> Self {
        Self {
            converted: Some(converted),
            unmapped: (!unmapped.is_empty()).then_some(unmapped),
        }
    }

    /// A record that could not be converted; the whole input is unmapped.
    pub fn not_converted(data: RawRecord) -> Self {
        Self {
            converted: None,
            unmapped: Some(data),
        }
    }

    pub fn is_converted(&self) -> bool {
        self.converted.is_some()
    }
}

// ---------------------------------------------------------------------------
// Converter contract
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Converter: Send + Sync {
    fn supported_profile(&self) -> &'static str;

    fn supported_entity(&self) -> &'static str;

    fn supports(&self, profile: &str, entity: &str) -> bool {
        self.supported_profile() == profile && self.supported_entity() == entity
    }

    async fn convert(
        &self,
        data: RawRecord,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<ConvertStruct, MigrationError>;

    /// Flush buffered mappings. Called once per batch.
    async fn write_mapping(&self, services: &mut RunServices) -> Result<(), MigrationError> {
        services.mapping.flush().await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Value coercion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    DateTime,
}

/// Move `source[source_key]` to `target[target_key]`, coerced to `ty`.
///
/// The source key is always consumed. Absent, null, empty or unparseable
/// values leave the target key unset.
pub fn convert_value(
    target: &mut TargetRecord,
    target_key: &str,
    source: &mut RawRecord,
    source_key: &str,
    ty: FieldType,
) {
    let Some(raw) = source.remove(source_key) else {
        return;
    };
    if let Some(value) = coerce(&raw, ty) {
        target.insert(target_key.to_string(), value);
    }
}

fn coerce(raw: &Value, ty: FieldType) -> Option<Value> {
    match (ty, raw) {
        (_, Value::Null) => None,
        (_, Value::String(s)) if s.is_empty() => None,
        (FieldType::String, Value::String(s)) => Some(Value::String(s.clone())),
        (FieldType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (FieldType::String, Value::Bool(b)) => Some(Value::String(if *b { "1" } else { "0" }.into())),
        (FieldType::Int, _) => scalar_f64(raw).map(|f| Value::from(f as i64)),
        (FieldType::Float, _) => scalar_f64(raw).map(Value::from),
        (FieldType::Bool, _) => scalar_bool(raw).map(Value::Bool),
        (FieldType::DateTime, Value::String(s)) => parse_datetime(s).map(|d| Value::String(d.to_rfc3339())),
        _ => None,
    }
}

fn scalar_f64(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn scalar_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim() {
            "0" | "false" => Some(false),
            "1" | "true" => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Legacy timestamps are `YYYY-MM-DD HH:MM:SS` in UTC; RFC 3339 and plain
/// dates are accepted as well.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Record helpers
// ---------------------------------------------------------------------------

/// Whether a field counts as present for required-field checks.
pub(crate) fn is_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

/// Names of the required fields that are missing or empty.
pub(crate) fn empty_required_fields(data: &RawRecord, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter(|k| !is_filled(data.get(**k)))
        .map(|k| k.to_string())
        .collect()
}

/// Scalar field as a string; numbers are rendered without quotes.
pub(crate) fn field_str(data: &RawRecord, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

pub(crate) fn field_f64(data: &RawRecord, key: &str) -> Option<f64> {
    data.get(key).and_then(scalar_f64)
}

pub(crate) fn field_i64(data: &RawRecord, key: &str) -> Option<i64> {
    field_f64(data, key).map(|f| f as i64)
}

pub(crate) fn field_bool(data: &RawRecord, key: &str) -> bool {
    data.get(key).and_then(scalar_bool).unwrap_or(false)
}

pub(crate) fn object<'a>(data: &'a RawRecord, key: &str) -> Option<&'a RawRecord> {
    data.get(key).and_then(Value::as_object)
}

pub(crate) fn take_object(data: &mut RawRecord, key: &str) -> Option<RawRecord> {
    match data.remove(key)? {
        Value::Object(o) => Some(o),
        _ => None,
    }
}

pub(crate) fn remove_keys(data: &mut RawRecord, keys: &[&str]) {
    for key in keys {
        data.remove(*key);
    }
}

/// Legacy attributes as custom fields named `<entity>_<attribute>`.
pub(crate) fn custom_fields(entity: &str, attributes: &RawRecord, skip: &[&str]) -> TargetRecord {
    attributes
        .iter()
        .filter(|(name, _)| !skip.contains(&name.as_str()))
        .map(|(name, value)| (format!("{entity}_{name}"), value.clone()))
        .collect()
}

pub(crate) fn uuid_value(uuid: Uuid) -> Value {
    Value::String(uuid.to_string())
}

/// Insert `translation` under the language id in `record["translations"]`.
pub(crate) fn add_translation(record: &mut TargetRecord, language_id: Uuid, translation: TargetRecord) {
    let translations = record
        .entry("translations")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(map) = translations {
        map.insert(language_id.to_string(), Value::Object(translation));
    }
}

/// Whether `locale` is the locale of the system language.
pub(crate) async fn is_default_locale(
    ctx: &MigrationContext,
    services: &mut RunServices,
    locale: &str,
) -> Result<bool, MigrationError> {
    let language = services.mapping.default_language(ctx.target.language_id).await?;
    Ok(language.locale_code == locale)
}
